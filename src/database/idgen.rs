use snowflake::SnowflakeIdGenerator;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, UNIX_EPOCH};

const SNOWFLAKE_EPOCH: u64 = 1669205840566;

// 5 bits machine id + 5 bits node id
pub const MAX_INSTANCE_ID: u16 = 1023;

static GENERATOR: once_cell::sync::OnceCell<Mutex<SnowflakeIdGenerator>> = once_cell::sync::OnceCell::new();

fn generator(instance_id: u16) -> Mutex<SnowflakeIdGenerator> {
    let epoch = UNIX_EPOCH + Duration::from_millis(SNOWFLAKE_EPOCH);
    let instance_id = (instance_id & MAX_INSTANCE_ID) as i32;
    Mutex::new(SnowflakeIdGenerator::with_epoch(instance_id >> 5, instance_id & 31, epoch))
}

// pins the instance id, returns false when ids were already handed out
pub fn init(instance_id: u16) -> bool {
    GENERATOR.set(generator(instance_id)).is_ok()
}

// ledger entry ids, unique per instance and roughly time ordered
pub fn next() -> i64 {
    GENERATOR
        .get_or_init(|| generator(fastrand::u16(..=MAX_INSTANCE_ID)))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .generate()
}
