//! 日志初始化集成测试.
//!
//! tracing 的全局订阅器每个进程只能设置一次, 所以全部断言放在同一个测试里.

use mediademux::logging::{self, LoggingConfig};

#[test]
fn test_初始化创建目录且只能成功一次() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let config = LoggingConfig {
        level: "debug".to_string(),
        directory: log_dir.to_string_lossy().to_string(),
        file_prefix: "test".to_string(),
        console: false,
        max_log_files: 3,
    };

    logging::init(config.clone()).unwrap();
    assert!(log_dir.is_dir(), "日志目录应被创建");
    tracing::info!("日志系统已启动");

    let err = logging::init(config).unwrap_err();
    assert!(err.to_string().contains("已初始化"), "{err:#}");
}
