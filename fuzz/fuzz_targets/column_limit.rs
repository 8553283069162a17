#![no_main]

use libfuzzer_sys::fuzz_target;
use session_store_core::storage::{ColumnInfo, declared_limit};

fuzz_target!(|data: &[u8]| {
    let declared_type = String::from_utf8_lossy(data);
    let limit = declared_limit(&declared_type);
    if let Some(limit) = limit {
        assert!(limit > 0);
    }
    assert_eq!(ColumnInfo::new("data", &*declared_type).limit, limit);
});
