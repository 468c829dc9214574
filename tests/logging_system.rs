use chrono::Local;
use std::fs;
use tao::logging::{LoggingConfig, build_current_log_path, init, prune_expired_logs};
use tempfile::TempDir;

// tracing 的全局订阅器只能初始化一次, 本文件只有一个测试调用 init()

#[test]
fn test_logging_init_writes_syntax_trace() {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(err) => panic!("创建临时目录失败: {}", err),
    };
    let directory = temp_dir.path().join("logs");
    let config = LoggingConfig {
        level: "info".to_string(),
        directory: directory.to_string_lossy().to_string(),
        file_prefix: "hevc".to_string(),
        syntax_trace: true,
        retention_days: 7,
    };

    let result = init(config.clone());
    assert!(result.is_ok(), "日志系统初始化应该成功: {:?}", result.err());
    assert!(directory.exists(), "日志目录应该被创建");

    let today = Local::now().date_naive();
    let path = build_current_log_path(&directory, &config.file_prefix, today);
    assert!(path.exists(), "当前日期的日志文件应该存在");

    // 再次初始化应报错而不是 panic
    assert!(init(config).is_err());
}

#[test]
fn test_prune_keeps_recent_logs() {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(err) => panic!("创建临时目录失败: {}", err),
    };
    let today = Local::now().date_naive();
    let current = build_current_log_path(temp_dir.path(), "hevc", today);
    assert!(fs::write(&current, b"line\n").is_ok());
    let old = temp_dir.path().join("hevc.2000-01-01.log");
    assert!(fs::write(&old, b"line\n").is_ok());

    let removed = prune_expired_logs(temp_dir.path(), "hevc", 30, today);
    assert_eq!(removed.ok(), Some(1));
    assert!(current.exists());
    assert!(!old.exists());
}

#[test]
fn test_logging_config_from_json_defaults() {
    let json = r#"{"level":"debug","directory":"logs","file_prefix":"hevc"}"#;
    let config: LoggingConfig = match serde_json::from_str(json) {
        Ok(config) => config,
        Err(err) => panic!("解析配置失败: {}", err),
    };
    assert!(!config.syntax_trace);
    assert_eq!(config.retention_days, 30);
}
