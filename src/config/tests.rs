use super::*;
use serial_test::serial;

#[test]
#[serial]
fn config_dir_env_override() {
    // SAFETY: test is serialized, no other thread reads the environment
    unsafe {
        std::env::set_var("STUDY_RAG_CONFIG_DIR", "/tmp/study-rag-override");
    }

    let dir = get_config_dir().expect("should resolve config dir");
    assert_eq!(dir, std::path::PathBuf::from("/tmp/study-rag-override"));

    // SAFETY: see above
    unsafe {
        std::env::remove_var("STUDY_RAG_CONFIG_DIR");
    }
}

#[test]
#[serial]
fn config_dir_defaults_under_user_config() {
    // SAFETY: test is serialized, no other thread reads the environment
    unsafe {
        std::env::remove_var("STUDY_RAG_CONFIG_DIR");
    }

    let dir = get_config_dir().expect("should resolve config dir");
    assert!(dir.ends_with("study-rag"));
}
