use probe_ingest::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("PROBES_PROFILE");
        env::remove_var("PROBES_API_BIND_ADDR");
        env::remove_var("PROBES_LOG_LEVEL");
        env::remove_var("PROBES_INGEST_MAX_IDENTIFIER_LEN");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    let cfg = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8000");
    assert_eq!(cfg.log_level, "info");
    assert!(cfg.run_migrations);
    assert_eq!(cfg.ingest.store_timeout_ms, 5000);
    assert_eq!(cfg.status.stale_after_seconds, 3600);
    cfg.bind_addr().expect("default bind addr parses");
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "PROBES_PROFILE=staging\nPROBES_LOG_LEVEL=warn\n");
    write_env_file(&dir, ".env.local", "PROBES_LOG_LEVEL=debug\n");
    write_env_file(
        &dir,
        ".env.staging",
        "PROBES_API_BIND_ADDR=127.0.0.1:9000\nPROBES_RUN_MIGRATIONS=false\n",
    );
    write_env_file(&dir, ".env.staging.local", "PROBES_API_BIND_ADDR=127.0.0.1:9001\n");

    let cfg = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();

    assert_eq!(cfg.profile, "staging");
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.api_bind_addr, "127.0.0.1:9001");
    assert!(!cfg.run_migrations);
}

#[test]
fn process_env_overrides_files() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "PROBES_INGEST_MAX_IDENTIFIER_LEN=32\n");
    unsafe {
        env::set_var("PROBES_INGEST_MAX_IDENTIFIER_LEN", "16");
    }

    let cfg = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();
    clear_env();

    assert_eq!(cfg.ingest.max_identifier_len, 16);
}

#[test]
fn out_of_range_identifier_length_fails_validation() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "PROBES_INGEST_MAX_IDENTIFIER_LEN=1000\n");

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap_err();

    assert!(matches!(
        err,
        ConfigError::InvalidIdentifierLength { value: 1000 }
    ));
}

#[test]
fn invalid_bind_address_fails() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "PROBES_API_BIND_ADDR=localhost\n");

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
}
