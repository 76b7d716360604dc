use sobject_sync::{file_store, OperationConfig, SurrealOpts};
use sobject_sync_file::FileRole;
use std::path::PathBuf;

#[test]
fn test_surreal_opts_conversion() {
    let opts = SurrealOpts {
        surreal_endpoint: "ws://localhost:8000".to_string(),
        surreal_username: "root".to_string(),
        surreal_password: "secret".to_string(),
        namespace: "crm".to_string(),
        database: "prod".to_string(),
    };

    let converted: surreal_store::SurrealOpts = (&opts).into();
    assert_eq!(converted.surreal_endpoint, "ws://localhost:8000");
    assert_eq!(converted.surreal_username, "root");
    assert_eq!(converted.surreal_password, "secret");
}

#[test]
fn test_file_store_applies_step_files() {
    let config = OperationConfig::from_yaml(
        r#"
data_dir: /data
steps:
  - object_type: Account
    file: accounts.csv
    result_file: /results/accounts.csv
  - object_type: Contact
"#,
    )
    .unwrap();

    let load_files = file_store(&config, FileRole::Input);
    assert_eq!(
        load_files.path_for("Account", FileRole::Input),
        PathBuf::from("/data/accounts.csv")
    );
    assert_eq!(
        load_files.path_for("Account", FileRole::Result),
        PathBuf::from("/results/accounts.csv")
    );
    assert_eq!(
        load_files.path_for("Contact", FileRole::Input),
        PathBuf::from("/data/Contact.csv")
    );

    let extract_files = file_store(&config, FileRole::Output);
    assert_eq!(
        extract_files.path_for("Account", FileRole::Output),
        PathBuf::from("/data/accounts.csv")
    );
    assert_eq!(
        extract_files.path_for("Account", FileRole::Input),
        PathBuf::from("/data/Account.csv")
    );
}
