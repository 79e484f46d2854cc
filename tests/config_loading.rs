use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use qexec::config::load_and_validate;
use qexec::errors::QexecError;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_topic_is_resolved() {
    let file = config_file(
        r#"
[common]
client_id = "worker-1"
servers = "q1:4150"
channel = "batch"

[topic.resize]
cmd = "bin/resize --id {{.ID}}"
workdir = "/srv/jobs"
servers = "q2:4150,q3:4150"
concurrency = 4
max_attempts = 5
requeue_delay = "10s"
notify_start = "hooks/start {{.ID}}"
notify_fault = "/usr/local/bin/alert {{.Topic}}"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.client_id.as_deref(), Some("worker-1"));

    let t = cfg.topic("resize").unwrap();
    assert_eq!(t.cmd, "/srv/jobs/bin/resize --id {{.ID}}");
    assert_eq!(t.workdir, Some(PathBuf::from("/srv/jobs")));
    assert_eq!(t.servers, vec!["q2:4150", "q3:4150"]);
    assert_eq!(t.channel, "batch");
    assert_eq!(t.concurrency, 4);
    assert_eq!(t.max_attempts, 5);
    assert_eq!(t.requeue_delay, std::time::Duration::from_secs(10));
    assert_eq!(t.notify_start.as_deref(), Some("/srv/jobs/hooks/start {{.ID}}"));
    assert_eq!(t.notify_finish, None);
    assert_eq!(t.notify_fault.as_deref(), Some("/usr/local/bin/alert {{.Topic}}"));
    assert_eq!(t.exit_policy().requeue_code(), Some(100));
}

#[test]
fn config_without_topics_is_rejected() {
    let file = config_file(
        r#"
[common]
servers = "q1:4150"
"#,
    );

    match load_and_validate(file.path()) {
        Err(QexecError::ConfigError(msg)) => assert!(msg.contains("at least one [topic.<name>]")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn topic_without_cmd_is_rejected() {
    let file = config_file(
        r#"
[common]
servers = "q1:4150"

[topic.empty]
cmd = "   "
"#,
    );

    match load_and_validate(file.path()) {
        Err(QexecError::ConfigError(msg)) => {
            assert!(msg.contains("[topic.empty]"));
            assert!(msg.contains("cmd"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn zero_concurrency_is_rejected() {
    let file = config_file(
        r#"
[common]
servers = "q1:4150"

[topic.t]
cmd = "true"
concurrency = 0
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(QexecError::ConfigError(ref m)) if m.contains("concurrency")
    ));
}

#[test]
fn bad_requeue_delay_is_rejected() {
    let file = config_file(
        r#"
[common]
servers = "q1:4150"

[default]
requeue_delay = "soon"

[topic.t]
cmd = "true"
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(QexecError::ConfigError(ref m)) if m.contains("requeue_delay")
    ));
}

#[test]
fn overflowing_requeue_delay_is_rejected() {
    let file = config_file(
        r#"
[common]
servers = "q1:4150"

[topic.t]
cmd = "true"
requeue_delay = "99999999999999999h"
"#,
    );

    match load_and_validate(file.path()) {
        Err(QexecError::ConfigError(msg)) => assert!(msg.contains("out of range"), "got {msg}"),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = config_file("[topic.t\ncmd = ");
    assert!(matches!(load_and_validate(file.path()), Err(QexecError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let result = load_and_validate("/definitely/not/here/qexec.toml");
    assert!(matches!(result, Err(QexecError::IoError(_))));
}
