// SPDX-License-Identifier: MIT

use super::*;
use tempfile::tempdir;

fn write(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, bytes).expect("write");
}

#[test]
fn echo_validates_and_runs() {
    let task = Task::Echo {
        msg: "hi".to_string(),
    };
    assert_eq!(task.validate(), Validation::Ok);
    assert_eq!(task.run().expect("run"), RunOutcome::Completed);
}

#[test]
fn fail_task_always_errors() {
    let task = Task::Fail;
    assert_eq!(task.validate(), Validation::Ok);
    assert!(task.run().is_err());
}

#[test]
fn copy_missing_src_is_not_found() {
    let dir = tempdir().expect("tmpdir");
    let task = Task::Copy {
        src: dir.path().join("missing"),
        dst: dir.path().join("dst"),
    };
    assert_eq!(task.validate(), Validation::FileNotFound);
    assert!(matches!(task.run(), Err(TaskError::NotFound(_))));
}

#[test]
fn copy_identical_destination_is_skipped() {
    let dir = tempdir().expect("tmpdir");
    let src = dir.path().join("s.txt");
    let dst = dir.path().join("d.txt");
    write(&src, b"foo");
    write(&dst, b"foo");

    let task = Task::Copy {
        src: src.clone(),
        dst: dst.clone(),
    };
    assert_eq!(task.validate(), Validation::FileExistsIdentical);
    assert_eq!(task.run().expect("run"), RunOutcome::Skipped);
}

#[test]
fn copy_differing_destination_fails() {
    let dir = tempdir().expect("tmpdir");
    let src = dir.path().join("s.txt");
    let dst = dir.path().join("d.txt");
    write(&src, b"foo");
    write(&dst, b"bar");

    let task = Task::Copy {
        src: src.clone(),
        dst: dst.clone(),
    };
    assert_eq!(task.validate(), Validation::FileExistsDiffers);
    assert!(matches!(task.run(), Err(TaskError::DestExistsDiffers(_))));
}

#[test]
fn copy_creates_missing_parent_dirs() {
    let dir = tempdir().expect("tmpdir");
    let src = dir.path().join("s.txt");
    write(&src, b"foo");
    let dst = dir.path().join("a/b/c/d.txt");

    let task = Task::Copy {
        src,
        dst: dst.clone(),
    };
    assert_eq!(task.run().expect("run"), RunOutcome::Completed);
    assert_eq!(fs::read(&dst).expect("read"), b"foo");
}

#[test]
fn move_renames_and_removes_source() {
    let dir = tempdir().expect("tmpdir");
    let src = dir.path().join("s.txt");
    let dst = dir.path().join("d.txt");
    write(&src, b"foo");

    let task = Task::Move {
        src: src.clone(),
        dst: dst.clone(),
        parent_oid: None,
    };
    assert_eq!(task.run().expect("run"), RunOutcome::Completed);
    assert!(!src.exists());
    assert_eq!(fs::read(&dst).expect("read"), b"foo");
}

#[test]
fn move_identical_destination_is_skipped_and_source_untouched() {
    let dir = tempdir().expect("tmpdir");
    let src = dir.path().join("s.txt");
    let dst = dir.path().join("d.txt");
    write(&src, b"foo");
    write(&dst, b"foo");

    let task = Task::Move {
        src: src.clone(),
        dst: dst.clone(),
        parent_oid: None,
    };
    assert_eq!(task.run().expect("run"), RunOutcome::Skipped);
    assert!(src.exists(), "skip must not touch the source");
}

#[test]
fn delete_removes_file() {
    let dir = tempdir().expect("tmpdir");
    let src = dir.path().join("s.txt");
    write(&src, b"foo");

    let task = Task::Delete { src: src.clone() };
    assert_eq!(task.run().expect("run"), RunOutcome::Completed);
    assert!(!src.exists());
}

#[test]
fn simple_convert_skips_when_dst_exists() {
    let dir = tempdir().expect("tmpdir");
    let src = dir.path().join("s.flac");
    let dst = dir.path().join("d.mp3");
    write(&src, b"audio");
    write(&dst, b"whatever");

    let task = Task::SimpleConvert {
        src,
        dst,
        converter: Converter::Copy,
    };
    assert_eq!(task.validate(), Validation::FileExistsCannotCompare);
    assert_eq!(task.run().expect("run"), RunOutcome::Skipped);
}

#[test]
fn convert_spawns_move_with_parent_link() {
    let dir = tempdir().expect("tmpdir");
    let task = Task::Convert {
        src: dir.path().join("s.flac"),
        dst: dir.path().join("d.mp3"),
        converter: Converter::Copy,
        tmpdst: dir.path().join("stage/d.mp3.tmp"),
    };

    let follow = task.spawn(42).expect("convert spawns a follow-up");
    match follow {
        Task::Move {
            src,
            dst,
            parent_oid,
        } => {
            assert_eq!(src, dir.path().join("stage/d.mp3.tmp"));
            assert_eq!(dst, dir.path().join("d.mp3"));
            assert_eq!(parent_oid, Some(42));
        }
        other => panic!("expected Move, got {other:?}"),
    }
}

#[test]
fn non_convert_tasks_never_spawn() {
    assert!(Task::Echo { msg: "x".into() }.spawn(1).is_none());
    assert!(Task::Fail.spawn(1).is_none());
}

#[test]
fn kind_classifies_convert_class() {
    assert!(TaskKind::Convert.is_convert());
    assert!(!TaskKind::SimpleConvert.is_convert());
    assert!(!TaskKind::Copy.is_convert());
}

#[test]
fn json_round_trips_for_every_variant() {
    let dir = tempdir().expect("tmpdir");
    let tasks = vec![
        Task::Echo {
            msg: "hi".to_string(),
        },
        Task::Sleep { seconds: 1.5 },
        Task::Fail,
        Task::Delete {
            src: dir.path().join("a"),
        },
        Task::Copy {
            src: dir.path().join("a"),
            dst: dir.path().join("b"),
        },
        Task::Move {
            src: dir.path().join("a"),
            dst: dir.path().join("b"),
            parent_oid: Some(7),
        },
        Task::SimpleConvert {
            src: dir.path().join("a.flac"),
            dst: dir.path().join("a.mp3"),
            converter: Converter::Copy,
        },
        Task::Convert {
            src: dir.path().join("a.flac"),
            dst: dir.path().join("a.mp3"),
            converter: Converter::Pydub {
                format: "mp3".into(),
                codec: Some("libmp3lame".into()),
                bitrate: Some("192k".into()),
                extra_params: vec![],
                id3v2_version: Some(3),
                remove_album_art: false,
            },
            tmpdst: dir.path().join("stage/a.mp3"),
        },
    ];

    for task in tasks {
        let json = serde_json::to_string(&task).expect("serialize");
        let back: Task = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(task, back);
    }
}

#[test]
fn numeric_type_tag_is_present_in_wire_form() {
    let json = serde_json::to_value(Task::Fail).expect("serialize");
    assert_eq!(json["type"], serde_json::json!(2));
}
