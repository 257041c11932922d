//! Buffer Sizes and Memory Constraints
//!
//! Every structure the registry owns is fixed-size. When a capacity is
//! reached the operation fails cleanly instead of allocating.

// ===== REGISTRY =====

/// Maximum number of simultaneously registered sensors.
///
/// Covers physical sensors plus the synthetic ones a fusion task exposes.
/// The free-slot bitset is a single `u64`, so this must not exceed 64.
pub const MAX_REGISTERED_SENSORS: usize = 32;

/// Maximum number of live (sensor, client) requests.
///
/// Sized as roughly `clients × sensors` for a typical hub: eight apps each
/// holding requests on eight sensors.
pub const MAX_CLI_SENS_MATRIX_SZ: usize = 64;

// ===== INTERNAL EVENTS =====

/// Capacity of the internal event slab.
///
/// Shared by completion signals (power, firmware, rate) and by calls
/// marshalled to remote sensor owners.
pub const MAX_INTERNAL_EVENTS: usize = 32;

/// Largest configuration blob a remote `cfg_data` call can carry (bytes).
pub const MAX_CFG_DATA_LEN: usize = 32;

// ===== TASK IDS =====

/// Number of bits a task id occupies at the top of a sensor handle.
pub const TASK_TID_BITS: u32 = 16;

/// Mask for the per-task counter in the low bits of a sensor handle.
pub const HANDLE_COUNTER_MASK: u32 = (1 << (32 - TASK_TID_BITS)) - 1;

const _: () = assert!(
    MAX_REGISTERED_SENSORS <= 64,
    "Sensor slot bitset is a single u64"
);
