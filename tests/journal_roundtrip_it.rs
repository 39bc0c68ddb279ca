use std::ffi::OsString;
use std::fs;

use bftwal::{Checkpoint, CodecError, Journal, MessageCodec, TaggedPayload};
use tempfile::tempdir;

struct RawCodec;

impl MessageCodec for RawCodec {
    type Message = Vec<u8>;

    fn encode(&self, message: &Vec<u8>) -> Result<TaggedPayload, CodecError> {
        Ok(TaggedPayload::new(7, message.clone()))
    }

    fn decode(&self, kind: u16, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        if kind != 7 {
            return Err(CodecError::UnknownKind { kind });
        }
        Ok(payload.to_vec())
    }
}

fn collect(journal: &Journal<RawCodec>, from: Checkpoint) -> Vec<Vec<u8>> {
    let mut seen = Vec::new();
    journal
        .load_journal(from, |message| seen.push(message))
        .unwrap();
    seen
}

#[test]
fn open_and_close_leave_a_single_empty_segment() {
    let dir = tempdir().unwrap();
    let mut journal = Journal::open(dir.path(), RawCodec).unwrap();
    journal.close();

    let names: Vec<OsString> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![OsString::from("wal.1")]);
    assert_eq!(fs::metadata(dir.path().join("wal.1")).unwrap().len(), 0);
}

#[test]
fn replay_returns_inserts_in_order() {
    let dir = tempdir().unwrap();
    {
        let mut journal = Journal::open(dir.path(), RawCodec).unwrap();
        for payload in [b"A".as_slice(), b"BB", b"CCC"] {
            journal.insert(&payload.to_vec(), true).unwrap();
        }
        journal.close();
    }

    let journal = Journal::open(dir.path(), RawCodec).unwrap();
    assert_eq!(
        collect(&journal, Checkpoint::new(1, 0)),
        [b"A".to_vec(), b"BB".to_vec(), b"CCC".to_vec()]
    );
}

#[test]
fn replaying_a_fresh_journal_delivers_nothing() {
    let dir = tempdir().unwrap();
    let journal = Journal::open(dir.path(), RawCodec).unwrap();
    assert!(collect(&journal, Checkpoint::new(1, 0)).is_empty());
}

#[test]
fn checkpoint_resumes_at_the_suffix() {
    let dir = tempdir().unwrap();
    let journal = Journal::open(dir.path(), RawCodec).unwrap();
    journal.insert(&b"first".to_vec(), true).unwrap();
    journal.insert(&b"second".to_vec(), true).unwrap();

    let checkpoint = journal.current_journal().unwrap();
    assert_eq!(checkpoint.file_id, 1);
    // two records: (5 + 10) + (6 + 10) bytes
    assert_eq!(checkpoint.offset, 31);

    journal.insert(&b"third".to_vec(), true).unwrap();
    assert_eq!(collect(&journal, checkpoint), [b"third".to_vec()]);
}

#[test]
fn checkpoint_survives_a_restart() {
    let dir = tempdir().unwrap();
    let checkpoint = {
        let mut journal = Journal::open(dir.path(), RawCodec).unwrap();
        journal.insert(&b"applied".to_vec(), true).unwrap();
        let checkpoint = journal.current_journal().unwrap();
        journal.insert(&b"pending".to_vec(), true).unwrap();
        journal.close();
        checkpoint
    };

    let journal = Journal::open(dir.path(), RawCodec).unwrap();
    assert_eq!(collect(&journal, checkpoint), [b"pending".to_vec()]);
}
