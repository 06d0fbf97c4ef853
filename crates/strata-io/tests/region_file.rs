use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use strata_io::{ChunkRecord, ColumnRecord, IoError, RegionFile, WorldStorage};
use strata_world::ChunkCoord;

fn record(coord: ChunkCoord, seed: u16) -> ChunkRecord {
    ChunkRecord {
        coord,
        populated: seed % 2 == 0,
        ids: (0..4096).map(|i| (i as u16).wrapping_mul(seed) % 7).collect(),
        data: (0..4096).map(|i| (i as u16) ^ seed).collect(),
        sky_light: vec![0xF0; 2048],
        block_light: (0..2048).map(|i| i as u8).collect(),
    }
}

proptest! {
    // Entries rewritten with different sizes always read back their latest bytes.
    #[test]
    fn rewrites_keep_latest_contents(sizes in proptest::collection::vec((0usize..8, 1usize..3000), 1..24)) {
        let dir = tempfile::tempdir().unwrap();
        let f = RegionFile::open(dir.path().join("t.srf"), 8, Duration::from_secs(60)).unwrap();
        let mut expect: Vec<Option<Vec<u8>>> = vec![None; 8];
        for (n, (entry, len)) in sizes.into_iter().enumerate() {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 31 + n) as u8).collect();
            f.write(entry, &bytes).unwrap();
            expect[entry] = Some(bytes);
        }
        for (i, e) in expect.iter().enumerate() {
            prop_assert_eq!(&f.read(i).unwrap(), e);
        }
    }
}

#[test]
fn reopen_preserves_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.srf");
    {
        let f = RegionFile::open(&path, 16, Duration::from_secs(60)).unwrap();
        f.write(3, b"hello").unwrap();
        f.write(9, &vec![7u8; 5000]).unwrap();
        assert!(f.attempt_close());
    }
    let f = RegionFile::open(&path, 16, Duration::from_secs(60)).unwrap();
    assert!(f.exists(3).unwrap());
    assert!(!f.exists(4).unwrap());
    assert_eq!(f.read(3).unwrap().as_deref(), Some(&b"hello"[..]));
    assert_eq!(f.read(9).unwrap().map(|v| v.len()), Some(5000));
    assert!(matches!(
        RegionFile::open(&path, 32, Duration::from_secs(60)),
        Err(IoError::EntriesMismatch { expected: 32, found: 16 })
    ));
}

#[test]
fn closed_file_rejects_access_and_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let f = RegionFile::open(dir.path().join("c.srf"), 4, Duration::from_millis(0)).unwrap();
    assert!(matches!(f.read(4), Err(IoError::EntryOutOfRange(4))));
    assert!(f.close_if_timed_out());
    assert!(f.is_closed());
    assert!(matches!(f.write(0, b"x"), Err(IoError::Closed)));
}

#[test]
fn parallel_writers_on_distinct_entries() {
    let dir = tempfile::tempdir().unwrap();
    let f = Arc::new(RegionFile::open(dir.path().join("p.srf"), 64, Duration::from_secs(60)).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let f = f.clone();
            std::thread::spawn(move || {
                for k in 0..8 {
                    let i = t * 8 + k;
                    f.write(i, &vec![i as u8; 300 + i * 17]).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for i in 0..64 {
        assert_eq!(f.read(i).unwrap(), Some(vec![i as u8; 300 + i * 17]));
    }
}

#[test]
fn storage_round_trips_chunks_and_columns() {
    let dir = tempfile::tempdir().unwrap();
    let storage = WorldStorage::new(dir.path(), Duration::from_secs(60));
    let coord = ChunkCoord::new(-3, 2, 17);
    assert!(!storage.chunk_exists(coord));
    assert!(storage.read_chunk(coord).is_none());
    let rec = record(coord, 5);
    storage.write_chunk(&rec).unwrap();
    assert!(storage.chunk_exists(coord));
    assert_eq!(storage.read_chunk(coord), Some(rec));

    let col = ColumnRecord { heights: (0..256).map(|i| i - 40).collect() };
    storage.write_column(-3, 17, &col).unwrap();
    assert_eq!(storage.read_column(-3, 17), Some(col));
    assert!(storage.read_column(-4, 17).is_none());
}

#[test]
fn storage_reopens_after_idle_close() {
    let dir = tempfile::tempdir().unwrap();
    let storage = WorldStorage::new(dir.path(), Duration::from_millis(0));
    let coord = ChunkCoord::new(0, 0, 0);
    storage.write_chunk(&record(coord, 2)).unwrap();
    assert_eq!(storage.close_idle(), 1);
    assert!(storage.read_chunk(coord).is_some());
}

#[test]
fn decode_rejects_bad_version_and_wrong_key() {
    let coord = ChunkCoord::new(1, 1, 1);
    let mut bytes = record(coord, 3).encode();
    assert!(ChunkRecord::decode(&bytes, ChunkCoord::new(1, 1, 2)).is_err());
    assert!(ChunkRecord::decode(&bytes[..100], coord).is_err());
    bytes[0] = 2;
    assert!(ChunkRecord::decode(&bytes, coord).is_err());

    let mut col = ColumnRecord { heights: vec![5; 256] }.encode();
    col[0] = 9;
    assert!(ColumnRecord::decode(&col).is_err());
}

fn patch(path: &std::path::Path, offset: usize, value: i32) {
    let mut bytes = std::fs::read(path).unwrap();
    bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    std::fs::write(path, bytes).unwrap();
}

#[test]
fn forged_headers_are_rejected_not_trusted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("h.srf");
    {
        let f = RegionFile::open(&path, 4, Duration::from_secs(60)).unwrap();
        f.write(1, &[9u8; 700]).unwrap();
        assert!(f.attempt_close());
    }
    let pristine = std::fs::read(&path).unwrap();
    let open = || RegionFile::open(&path, 4, Duration::from_secs(60));

    // Segment shift far past the width of an offset.
    patch(&path, 4, 70);
    assert!(matches!(open(), Err(IoError::Corrupt(_))));
    patch(&path, 4, -1);
    assert!(matches!(open(), Err(IoError::Corrupt(_))));

    // Entry 1 claims to start far beyond the end of the file.
    std::fs::write(&path, &pristine).unwrap();
    patch(&path, 12 + 8, 0x7FFF_FFF0);
    assert!(matches!(open(), Err(IoError::Corrupt(_))));

    // Entry 1 claims more bytes than the file holds.
    std::fs::write(&path, &pristine).unwrap();
    patch(&path, 12 + 8 + 4, 1 << 30);
    assert!(matches!(open(), Err(IoError::Corrupt(_))));

    std::fs::write(&path, &pristine).unwrap();
    assert_eq!(open().unwrap().read(1).unwrap().map(|v| v.len()), Some(700));
}

#[test]
fn corrupt_region_file_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let coord = ChunkCoord::new(0, 0, 0);
    {
        let storage = WorldStorage::new(dir.path(), Duration::from_secs(60));
        storage.write_chunk(&record(coord, 4)).unwrap();
        storage.close_all();
    }
    patch(&dir.path().join("region").join("reg0_0_0.srf"), 4, 70);
    let storage = WorldStorage::new(dir.path(), Duration::from_secs(60));
    assert!(!storage.chunk_exists(coord));
    assert!(storage.read_chunk(coord).is_none());
}

#[test]
fn segment_shift_outside_range_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        RegionFile::open_with_segments(dir.path().join("s.srf"), 64, 4, Duration::from_secs(60)),
        Err(IoError::Corrupt(_))
    ));
}
