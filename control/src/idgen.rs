use anyhow::{bail, Context, Result};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

// Generator epoch: 2024-01-01T00:00:00Z
const EPOCH_UNIX_MS: u64 = 1_704_067_200_000;
const TICK_MS: u64 = 10;

const TIME_BITS: u32 = 39;
const SEQUENCE_BITS: u32 = 8;
const MACHINE_BITS: u32 = 16;
const SEQUENCE_MASK: u16 = (1 << SEQUENCE_BITS) - 1;

/// Snowflake-style unique id generator for deploy and task ids.
///
/// Ids pack a 39-bit 10ms-tick timestamp, an 8-bit per-tick sequence and a
/// 16-bit machine id into 63 bits, so they stay unique across controller
/// restarts without any persisted state. Give each controller instance its
/// own machine id.
pub struct IdGenerator {
    machine_id: u16,
    state: Mutex<GenState>,
}

struct GenState {
    last_tick: u64,
    sequence: u16,
}

impl IdGenerator {
    pub fn new(machine_id: u16) -> Self {
        Self {
            machine_id,
            state: Mutex::new(GenState {
                last_tick: 0,
                sequence: 0,
            }),
        }
    }

    pub fn next(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        let mut tick = current_tick()?;
        if tick < state.last_tick {
            // Clock went backwards; keep minting from the last seen tick.
            tick = state.last_tick;
        }

        if tick == state.last_tick {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence space for this tick is spent, borrow the next one.
                tick += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_tick = tick;

        if tick >= (1 << TIME_BITS) {
            bail!("id space exhausted at tick {}", tick);
        }

        Ok((tick << (SEQUENCE_BITS + MACHINE_BITS))
            | ((state.sequence as u64) << MACHINE_BITS)
            | self.machine_id as u64)
    }
}

fn current_tick() -> Result<u64> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock before unix epoch")?
        .as_millis() as u64;
    if now_ms < EPOCH_UNIX_MS {
        bail!("System clock before generator epoch");
    }
    Ok((now_ms - EPOCH_UNIX_MS) / TICK_MS)
}
