/*!
 * Push gating: staging, readme and validation preconditions
 */

mod common;

use std::fs;

use common::{memory_manager, single_mission};
use fieldvault::{DataManager, FieldError, MemoryStore};
use tempfile::{tempdir, TempDir};

struct Fixture {
    _config: TempDir,
    _data: TempDir,
    _source: TempDir,
    readmes: TempDir,
    app: DataManager<MemoryStore>,
}

fn fixture() -> Fixture {
    let config = tempdir().unwrap();
    let data = tempdir().unwrap();
    let source = tempdir().unwrap();
    let mut app = memory_manager(config.path());
    single_mission(&mut app, data.path(), source.path(), 2);
    Fixture {
        _config: config,
        _data: data,
        _source: source,
        readmes: tempdir().unwrap(),
        app,
    }
}

fn commit_readme(fixture: &mut Fixture, name: &str) {
    let readme = fixture.readmes.path().join(name);
    fs::write(&readme, "readme\n").unwrap();
    fixture.app.add(&[&readme], true, None).unwrap();
    fixture.app.commit(true).unwrap();
}

#[test]
fn test_push_rejects_txt_readme() {
    let mut fixture = fixture();
    commit_readme(&mut fixture, "README.txt");
    let push = tempdir().unwrap();

    let err = fixture.app.push(push.path()).unwrap_err();
    assert!(matches!(err, FieldError::IllegalReadmeFormat(_)));
    assert!(!fixture.app.active_dataset().unwrap().is_pushed());
    assert_eq!(fs::read_dir(push.path()).unwrap().count(), 0);
}

#[test]
fn test_push_accepts_md_readme() {
    let mut fixture = fixture();
    commit_readme(&mut fixture, "README.md");
    let push = tempdir().unwrap();

    let destination = fixture.app.push(push.path()).unwrap();
    let name = fixture.app.active_dataset().unwrap().name();
    assert_eq!(destination, push.path().join(&name));
    assert!(destination.join("README.md").is_file());
    assert!(destination.join("manifest.json").is_file());
    assert!(destination.join("ED-00/TSF001/0000.bin").is_file());
    assert!(fixture.app.active_dataset().unwrap().is_pushed());
}

#[test]
fn test_accepted_readme_names() {
    for name in ["readme.md", "Readme.MD", "README.docx", "readme.DOCX"] {
        let mut fixture = fixture();
        commit_readme(&mut fixture, name);
        let push = tempdir().unwrap();
        assert!(fixture.app.push(push.path()).is_ok(), "{} rejected", name);
    }
}

#[test]
fn test_push_requires_readme() {
    let mut fixture = fixture();
    let push = tempdir().unwrap();
    let err = fixture.app.push(push.path()).unwrap_err();
    assert!(matches!(err, FieldError::ReadmeNotFound(_)));
}

#[test]
fn test_push_refuses_pending_staging() {
    let mut fixture = fixture();
    commit_readme(&mut fixture, "readme.md");

    let pending = fixture.readmes.path().join("late.bin");
    fs::write(&pending, b"late").unwrap();
    fixture.app.add(&[&pending], false, None).unwrap();

    let push = tempdir().unwrap();
    let err = fixture.app.push(push.path()).unwrap_err();
    assert!(matches!(err, FieldError::FilesStaged { count: 1 }));
}

#[test]
fn test_push_refuses_invalid_dataset() {
    let mut fixture = fixture();
    commit_readme(&mut fixture, "readme.md");
    let root = fixture.app.active_dataset().unwrap().root().to_path_buf();
    fs::write(root.join("ED-00/TSF001/0001.bin"), b"bit rot").unwrap();

    let push = tempdir().unwrap();
    let err = fixture.app.push(push.path()).unwrap_err();
    assert!(matches!(err, FieldError::DatasetInvalid { .. }));
    assert!(err.is_integrity_failure());
    let name = fixture.app.active_dataset().unwrap().name();
    assert!(!push.path().join(name).exists());
}

#[test]
fn test_push_readme_renamed_in_place() {
    let mut fixture = fixture();
    let root = fixture.app.active_dataset().unwrap().root().to_path_buf();
    fs::write(root.join("README.txt"), "readme\n").unwrap();
    let push = tempdir().unwrap();

    let err = fixture.app.push(push.path()).unwrap_err();
    assert!(matches!(err, FieldError::IllegalReadmeFormat(_)));

    fs::rename(root.join("README.txt"), root.join("README.md")).unwrap();
    let destination = fixture.app.push(push.path()).unwrap();
    assert!(destination.join("README.md").is_file());
    assert!(fixture.app.active_dataset().unwrap().is_pushed());
    assert!(fixture.app.validate().unwrap());
}

#[test]
fn test_push_into_own_parent_refused() {
    let mut fixture = fixture();
    commit_readme(&mut fixture, "readme.md");
    let root = fixture.app.active_dataset().unwrap().root().to_path_buf();
    let data_file = root.join("ED-00/TSF001/0000.bin");
    let before = fs::read(&data_file).unwrap();

    let err = fixture.app.push(root.parent().unwrap()).unwrap_err();
    assert!(matches!(err, FieldError::DestinationInsideDataset { .. }));
    assert!(!err.is_integrity_failure());
    assert_eq!(fs::read(&data_file).unwrap(), before);
    assert!(fixture.app.validate().unwrap());
    assert!(!fixture.app.active_dataset().unwrap().is_pushed());
}

#[test]
fn test_duplicate_inside_dataset_refused() {
    let fixture = fixture();
    let root = fixture.app.active_dataset().unwrap().root().to_path_buf();

    for destination in [root.clone(), root.join("backup"), root.join("ED-00/../ED-00")] {
        let err = fixture.app.duplicate(&[&destination]).unwrap_err();
        assert!(matches!(err, FieldError::DestinationInsideDataset { .. }));
    }
    assert!(!root.join("backup").exists());
    assert!(fixture.app.validate().unwrap());
}
