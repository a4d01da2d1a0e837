use once_cell::sync::Lazy;

/// Specifies how many random object identifiers are attempted before object
/// creation fails with [`crate::err::Error::IdExhausted`].
pub static ID_GENERATE_ATTEMPTS: Lazy<u32> = lazy_env_parse!("SHALE_ID_GENERATE_ATTEMPTS", u32, 100);

/// Specifies the maximum number of cached object meta-data entries held by a
/// single transaction.
pub static OBJ_INFO_CACHE_SIZE: Lazy<usize> =
	lazy_env_parse!("SHALE_OBJ_INFO_CACHE_SIZE", usize, 1_000);

/// Datastore processor batch size for scan operations.
pub static SCAN_BATCH_SIZE: Lazy<u32> = lazy_env_parse!("SHALE_SCAN_BATCH_SIZE", u32, 500);

/// The maximum byte length of an encoded object-type, field, or index
/// storage-id. Storage-ids are unsigned integers below 2³⁰, so their
/// variable-length encoding never exceeds five bytes.
pub const MAX_STORAGE_ID_LENGTH: usize = 5;

/// The highest storage-id which may be assigned to a schema item.
pub const MAX_STORAGE_ID: u32 = (1 << 30) - 1;

/// The fixed byte length of an object identifier.
pub const OBJ_ID_LENGTH: usize = 8;
