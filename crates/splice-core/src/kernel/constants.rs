/// Application name
pub const APP_NAME: &str = "splice";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming a configuration file to load when `--config` is absent
pub const CONFIG_ENV_VAR: &str = "SPLICE_CONFIG";

/// Default stub index file name
pub const DEFAULT_INDEX_FILE: &str = "splice-index.json";

/// Symbol every artifact exports to receive its dependency handles and return its instance handle
pub const INIT_SYMBOL: &[u8] = b"__splice_extern_init\0";

/// Symbol every artifact exports to receive its resolved import handles
pub const INIT_IMPORTS_SYMBOL: &[u8] = b"__splice_extern_init_imports\0";

/// Host the daemon binds its control and bootstrap ports on
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// First port handed out by the daemon's port allocator
pub const DEFAULT_BASE_PORT: u16 = 47800;

/// Number of ports the allocator cycles through
pub const DEFAULT_PORT_SPAN: u16 = 200;

/// Sleep between non-blocking channel attempts
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Upper bound for a single frame on the controller/worker channel
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// How long the executer daemon waits for a connected client to send its request
pub const CONTROL_REQUEST_TIMEOUT_MS: u64 = 5_000;
