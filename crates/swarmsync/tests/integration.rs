use std::sync::Arc;

use swarmsync::data::{
    ContentKey, DataManager, LocationKey, MemoryMessenger, MemoryStore, Message, PeerId, ProtectionKeys, SendOutcome,
};
use swarmsync::process::{Process, ProcessComponent, ProcessState, ResultProcessComponent, SequentialProcess, Step};
use swarmsync::steps::PutStep;
use swarmsync::{Config, Credentials, Error, FileMeta, Session};

fn payload(len: usize) -> Vec<u8> { (0..len).map(|i| (i % 251) as u8).collect() }

fn session_over(store: &Arc<MemoryStore>) -> Session {
    let mut config = Config::default();
    config.upload.chunk_size = 64;
    config.download.concurrency = 2;
    Session::builder(Credentials::generate("alice"))
        .config(config)
        .data(store.clone())
        .build()
        .unwrap()
}

#[test]
fn failed_put_compensates_earlier_puts_and_skips_later_ones() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    let owner = session.credentials().protection().clone();
    let content = ContentKey::new("entry");

    let foreign = ProtectionKeys::generate();
    store
        .put(&LocationKey::new("second"), &content, b"not yours", &foreign)
        .unwrap();

    let root = SequentialProcess::new("three puts");
    for (location, data) in [("first", b"1"), ("second", b"2"), ("third", b"3")] {
        root.add(Step::new(PutStep::new(
            session.data().clone(),
            LocationKey::new(location),
            content.clone(),
            data.to_vec(),
            owner.clone(),
        )))
        .unwrap();
    }

    let err = session.run(root.clone()).unwrap_err();
    let Error::Failed(reason) = err else {
        panic!("expected a failed process, got {err:?}");
    };
    assert_eq!(reason.component_name(), "PutStep");
    assert!(reason.hint().contains("second"), "hint was {}", reason.hint());

    assert_eq!(root.state(), ProcessState::Failed);
    assert!(!store.contains(&LocationKey::new("first"), &content));
    assert!(!store.contains(&LocationKey::new("third"), &content));
    assert_eq!(root.children()[2].state(), ProcessState::Ready);
    assert_eq!(
        store.get(&LocationKey::new("second"), &content).unwrap(),
        Some(b"not yours".to_vec())
    );
}

#[test]
fn uploaded_file_downloads_intact() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    let content = payload(1000);

    let upload = session.processes().upload_file("notes.txt", content.clone()).unwrap();
    session.run(upload.clone()).unwrap();
    assert_eq!(upload.len(), 2, "meta put runs after the chunks");
    assert_eq!(store.len(), 1000usize.div_ceil(64) + 1);

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("notes.txt");
    let download = session
        .processes()
        .download_file("notes.txt", &destination)
        .unwrap();
    session.run(download.clone()).unwrap();

    assert_eq!(download.len(), 2);
    assert_eq!(std::fs::read(&destination).unwrap(), content);
    assert!(session.registry().is_empty());
}

#[test]
fn upload_from_disk_uses_file_name() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("photo.raw");
    std::fs::write(&source, payload(300)).unwrap();

    let upload = session.processes().upload_path(&source).unwrap();
    session.run(upload).unwrap();

    let (location, content) = FileMeta::keys("photo.raw");
    assert!(store.contains(&location, &content));
}

#[test]
fn meta_record_is_sealed() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    session
        .run(session.processes().upload_file("secret.txt", b"hush".to_vec()).unwrap())
        .unwrap();

    let (location, content) = FileMeta::keys("secret.txt");
    let get = session.processes().get(location, content);
    session.run(get.clone()).unwrap();
    let sealed = get.result().unwrap();
    assert!(!sealed.windows(b"secret.txt".len()).any(|w| w == b"secret.txt"));

    let meta = FileMeta::open(&sealed, session.cipher().as_ref(), session.credentials().key()).unwrap();
    assert_eq!(meta.size, 4);
}

#[test]
fn download_of_unknown_file_fails() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("ghost");

    let err = session
        .run(session.processes().download_file("ghost", &destination).unwrap())
        .unwrap_err();
    let Error::Failed(reason) = err else {
        panic!("expected a failed process, got {err:?}");
    };
    assert_eq!(reason.component_name(), "ResolveDownloadStep");
    assert!(reason.hint().contains("ghost"));
    assert!(!destination.exists());
}

#[test]
fn download_with_missing_chunk_leaves_no_file() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    session
        .run(session.processes().upload_file("data.bin", payload(500)).unwrap())
        .unwrap();

    let (location, content) = FileMeta::keys("data.bin");
    let sealed = store.get(&location, &content).unwrap().unwrap();
    let meta = FileMeta::open(&sealed, session.cipher().as_ref(), session.credentials().key()).unwrap();
    let (chunk_location, chunk_content) = swarmsync::data::chunk_keys(&meta.chunks[3].id);
    store
        .remove(&chunk_location, &chunk_content, session.credentials().protection())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("data.bin");
    let err = session
        .run(session.processes().download_file("data.bin", &destination).unwrap())
        .unwrap_err();
    let Error::Failed(reason) = err else {
        panic!("expected a failed process, got {err:?}");
    };
    assert_eq!(reason.component_name(), "DownloadFileStep");
    assert!(!destination.exists());
}

#[test]
fn delete_removes_meta_and_chunks() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    session
        .run(session.processes().upload_file("old.log", payload(200)).unwrap())
        .unwrap();
    assert!(!store.is_empty());

    let delete = session.processes().delete_file("old.log").unwrap();
    session.run(delete.clone()).unwrap();

    assert!(store.is_empty());
    assert_eq!(delete.len(), 1 + 1 + 200usize.div_ceil(64));
}

#[test]
fn delete_of_foreign_file_restores_what_it_removed() {
    let store = Arc::new(MemoryStore::new());
    let alice = session_over(&store);
    alice
        .run(alice.processes().upload_file("shared.txt", payload(100)).unwrap())
        .unwrap();
    let before = store.len();

    // Same sealing key, other protection keys: the meta opens but nothing
    // can be removed.
    let credentials = Credentials::new(
        PeerId::new("mallory"),
        ProtectionKeys::generate(),
        alice.credentials().key().clone(),
    );
    let mallory = Session::builder(credentials).data(store.clone()).build().unwrap();
    let err = mallory
        .run(mallory.processes().delete_file("shared.txt").unwrap())
        .unwrap_err();

    assert!(matches!(err, Error::Failed(_)));
    assert_eq!(store.len(), before);
}

#[test]
fn batch_upload_stores_every_file() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    let files = vec![
        ("a.txt".to_string(), payload(10)),
        ("b.txt".to_string(), payload(100)),
        ("c.txt".to_string(), payload(1)),
    ];

    let batch = session.processes().upload_files(files).unwrap();
    session.run(batch.clone()).unwrap();

    assert_eq!(batch.state(), ProcessState::Succeeded);
    for name in ["a.txt", "b.txt", "c.txt"] {
        let (location, content) = FileMeta::keys(name);
        assert!(store.contains(&location, &content), "{name} missing");
    }
}

#[test]
fn peers_are_notified_with_resends() {
    let messenger = Arc::new(MemoryMessenger::new());
    let bob = PeerId::new("bob");
    messenger.script(&bob, [SendOutcome::Resend]);

    let session = Session::builder(Credentials::generate("alice"))
        .messages(messenger.clone())
        .build()
        .unwrap();
    let notify = session
        .processes()
        .notify_peers(vec![bob.clone(), PeerId::new("carol")], Message::new("file-added", "notes.txt"));
    session.run(notify.clone()).unwrap();

    assert_eq!(notify.state(), ProcessState::Succeeded);
    assert_eq!(messenger.sent_to(&bob).len(), 2);
    assert_eq!(messenger.sent_to(&PeerId::new("carol")).len(), 1);
}

#[test]
fn notification_failure_is_reported() {
    let messenger = Arc::new(MemoryMessenger::new());
    let bob = PeerId::new("bob");
    messenger.script(&bob, [SendOutcome::Failure("offline".into())]);

    let session = Session::builder(Credentials::generate("alice"))
        .messages(messenger.clone())
        .build()
        .unwrap();
    let err = session
        .run(session.processes().notify_peers(vec![bob], Message::new("file-added", "x")))
        .unwrap_err();

    let Error::Failed(reason) = err else {
        panic!("expected a failed process, got {err:?}");
    };
    assert!(reason.hint().contains("offline"));
}

#[test]
fn suspend_and_restore_with_nothing_running() {
    let session = Session::builder(Credentials::generate("alice")).build().unwrap();
    assert_eq!(session.suspend(), 0);
    assert_eq!(session.restore().unwrap(), 0);
    assert!(session.downloads().is_running());
}

fn chunk_ids(session: &Session, name: &str) -> Vec<String> {
    let (location, content) = FileMeta::keys(name);
    let get = session.processes().get(location, content);
    session.run(get.clone()).unwrap();
    let meta = FileMeta::open(&get.result().unwrap(), session.cipher().as_ref(), session.credentials().key()).unwrap();
    meta.chunks.into_iter().map(|c| c.id).collect()
}

fn download(session: &Session, name: &str, destination: &std::path::Path) -> swarmsync::Result<()> {
    session.run(session.processes().download_file(name, destination)?)
}

#[test]
fn files_with_equal_content_download_independently() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    let content = payload(300);
    for name in ["a.bin", "b.bin"] {
        session
            .run(session.processes().upload_file(name, content.clone()).unwrap())
            .unwrap();
    }

    let a = chunk_ids(&session, "a.bin");
    let b = chunk_ids(&session, "b.bin");
    assert!(a.iter().all(|id| !b.contains(id)), "files share a chunk entry");
    assert_eq!(store.len(), 2 * (300usize.div_ceil(64) + 1));

    let dir = tempfile::tempdir().unwrap();
    for name in ["a.bin", "b.bin"] {
        let destination = dir.path().join(name);
        download(&session, name, &destination).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), content, "{name} corrupted");
    }
}

#[test]
fn other_user_can_upload_content_already_stored() {
    let store = Arc::new(MemoryStore::new());
    let alice = session_over(&store);
    alice
        .run(alice.processes().upload_file("report.pdf", payload(200)).unwrap())
        .unwrap();

    let mut config = Config::default();
    config.upload.chunk_size = 64;
    let bob = Session::builder(Credentials::generate("bob"))
        .config(config)
        .data(store.clone())
        .build()
        .unwrap();
    bob.run(bob.processes().upload_file("copy.pdf", payload(200)).unwrap())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("copy.pdf");
    download(&bob, "copy.pdf", &destination).unwrap();
    assert_eq!(std::fs::read(&destination).unwrap(), payload(200));

    let destination = dir.path().join("report.pdf");
    download(&alice, "report.pdf", &destination).unwrap();
    assert_eq!(std::fs::read(&destination).unwrap(), payload(200));
}

#[test]
fn deleting_one_of_two_equal_files_keeps_the_other() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    for name in ["keep.txt", "drop.txt"] {
        session
            .run(session.processes().upload_file(name, payload(150)).unwrap())
            .unwrap();
    }

    session
        .run(session.processes().delete_file("drop.txt").unwrap())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("keep.txt");
    download(&session, "keep.txt", &destination).unwrap();
    assert_eq!(std::fs::read(&destination).unwrap(), payload(150));
    let (location, content) = FileMeta::keys("drop.txt");
    assert!(!store.contains(&location, &content));
}

#[test]
fn failed_download_leaves_existing_destination_alone() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    session
        .run(session.processes().upload_file("precious.txt", payload(200)).unwrap())
        .unwrap();
    for id in chunk_ids(&session, "precious.txt") {
        let (location, content) = swarmsync::data::chunk_keys(&id);
        store
            .remove(&location, &content, session.credentials().protection())
            .unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("precious.txt");
    std::fs::write(&destination, b"user data").unwrap();

    let err = download(&session, "precious.txt", &destination).unwrap_err();
    assert!(matches!(err, Error::Failed(_)), "{err:?}");
    assert_eq!(std::fs::read(&destination).unwrap(), b"user data");
}

#[test]
fn download_overwrites_existing_destination_on_success() {
    let store = Arc::new(MemoryStore::new());
    let session = session_over(&store);
    session
        .run(session.processes().upload_file("fresh.txt", payload(90)).unwrap())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("fresh.txt");
    std::fs::write(&destination, b"stale").unwrap();

    download(&session, "fresh.txt", &destination).unwrap();
    assert_eq!(std::fs::read(&destination).unwrap(), payload(90));
}
