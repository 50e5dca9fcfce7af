use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::compose;
use crate::control_client::ControlClient;
use crate::db::{execute_async, DbPool};
use crate::services::workloads;

const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Reconcile loop - observe containers every 30s and repair stored status
pub async fn reconcile_loop(db: DbPool, control: ControlClient) -> Result<()> {
    info!("Starting reconcile loop (every 30s)");

    loop {
        tokio::time::sleep(RECONCILE_INTERVAL).await;

        if let Err(e) = run_reconcile_cycle(&db, &control).await {
            error!("Reconcile cycle failed: {:#}", e);
        }
    }
}

pub(crate) async fn run_reconcile_cycle(db: &DbPool, control: &ControlClient) -> Result<()> {
    let workloads = execute_async(db, |conn| workloads::list_workloads(conn)).await?;

    for workload in workloads {
        let observed = compose::observe_workload(&workload.name).await;
        if !should_update(&workload.status, observed) {
            continue;
        }

        info!(
            "Workload '{}' (deployment {}) moved {} -> {}",
            workload.name, workload.deploy_id, workload.status, observed
        );

        let deploy_id = workload.deploy_id;
        let persisted = execute_async(db, move |conn| {
            workloads::update_status_by_deploy_id(conn, deploy_id, observed)
        })
        .await;
        if let Err(e) = persisted {
            error!("Cannot persist status of deployment {}: {:#}", deploy_id, e);
            continue;
        }

        // Push the change upstream; an unreachable control plane only costs
        // this report, the next cycle re-observes from scratch.
        if let Err(e) = control.report_deployment_status(deploy_id, observed).await {
            warn!(
                "Cannot report deployment {} to control plane: {:#}",
                deploy_id, e
            );
        }
    }

    Ok(())
}

/// Observation wins whenever it disagrees, and transitional states are
/// overwritten even by an identical reading so they cannot stick forever.
fn should_update(stored: &str, observed: &str) -> bool {
    stored != observed || stored == "starting" || stored == "failed"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::services::workloads;
    use crate::types::DeployRequest;

    #[test]
    fn transitions_that_must_be_written() {
        assert!(should_update("starting", "running"));
        assert!(should_update("starting", "not_deployed"));
        assert!(should_update("failed", "stopped"));
        assert!(should_update("running", "stopped"));
        assert!(should_update("stopped", "running"));

        assert!(!should_update("running", "running"));
        assert!(!should_update("stopped", "stopped"));
        assert!(!should_update("unknown", "unknown"));
        assert!(!should_update("not_deployed", "not_deployed"));
    }

    #[tokio::test]
    async fn cycle_with_no_workloads_is_a_no_op() {
        let db = init_test_db().unwrap();
        let control = ControlClient::new("http://127.0.0.1:1".to_string()).unwrap();

        run_reconcile_cycle(&db, &control).await.unwrap();
    }

    #[tokio::test]
    async fn cycle_survives_an_unreachable_control_plane() {
        let db = init_test_db().unwrap();
        {
            let conn = db.get().unwrap();
            workloads::insert_workload(
                &conn,
                &DeployRequest {
                    id: 1,
                    name: "web".to_string(),
                    description: String::new(),
                    app_type: "compose".to_string(),
                    content: "services: {}".to_string(),
                    version: String::new(),
                    server_id: 1,
                    deploy_id: 42,
                },
            )
            .unwrap();
        }
        let control = ControlClient::new("http://127.0.0.1:1".to_string()).unwrap();

        // Whatever the observation turns out to be, a dead upstream must not
        // fail the cycle.
        run_reconcile_cycle(&db, &control).await.unwrap();
    }
}
