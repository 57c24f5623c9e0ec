use anyhow::Result;

use burandb::{Database, Page};

mod common;
use common::{create_test_db, test_config};

// Each test record holds a string "record<n>" followed by the integer
// n + 100, built through a wrapped page the way log clients do.
fn make_record(n: i32) -> Vec<u8> {
    let s = format!("record{n}");
    let npos = Page::max_length(s.len());
    let mut page = Page::from_bytes(vec![0; npos + 4]);
    page.set_string(0, &s);
    page.set_int(npos, n + 100);
    page.into_bytes()
}

fn parse_record(bytes: &[u8]) -> (String, i32) {
    let page = Page::from_bytes(bytes.to_vec());
    let s = page.get_string(0);
    let n = page.get_int(Page::max_length(s.len()));
    (s, n)
}

fn append_records(db: &Database, range: std::ops::RangeInclusive<i32>) -> Result<()> {
    for n in range {
        db.log_manager().append(&make_record(n))?;
    }
    Ok(())
}

#[test]
fn empty_log_iterates_nothing() -> Result<()> {
    let (db, _dir) = create_test_db()?;
    assert_eq!(db.log_manager().iterator()?.count(), 0);
    Ok(())
}

#[test]
fn records_come_back_newest_first() -> Result<()> {
    let (db, _dir) = create_test_db()?;
    append_records(&db, 1..=35)?;

    // 35 records of this size span more than one 400-byte block.
    let mut expected = 35;
    for bytes in db.log_manager().iterator()? {
        let (s, n) = parse_record(&bytes?);
        assert_eq!(s, format!("record{expected}"));
        assert_eq!(n, expected + 100);
        expected -= 1;
    }
    assert_eq!(expected, 0, "iterator ended early at record{expected}");
    Ok(())
}

#[test]
fn lsns_increase_monotonically() -> Result<()> {
    let (db, _dir) = create_test_db()?;
    let mut last = 0;
    for n in 1..=20 {
        let lsn = db.log_manager().append(&make_record(n))?;
        assert!(lsn > last);
        last = lsn;
    }
    Ok(())
}

#[test]
fn flush_makes_records_durable() -> Result<()> {
    let (db, dir) = create_test_db()?;
    append_records(&db, 1..=70)?;
    db.log_manager().flush(65)?;

    // The live iterator flushes first, so it sees everything.
    let live: Vec<(String, i32)> = db
        .log_manager()
        .iterator()?
        .map(|bytes| Ok(parse_record(&bytes?)))
        .collect::<Result<_>>()?;
    assert_eq!(live.len(), 70);
    assert_eq!(live.first().unwrap().0, "record70");
    assert_eq!(live.last().unwrap(), &("record1".to_string(), 101));

    // A second engine over the same directory sees only what reached disk:
    // at least every record up to LSN 65, still newest-first and gapless
    // down to the very first record.
    drop(db);
    let reopened = Database::new(test_config(&dir))?;
    let durable: Vec<(String, i32)> = reopened
        .log_manager()
        .iterator()?
        .map(|bytes| Ok(parse_record(&bytes?)))
        .collect::<Result<_>>()?;

    assert!(durable.len() >= 65, "only {} records survived", durable.len());
    let newest = durable.first().unwrap().1 - 100;
    for (i, (s, n)) in durable.iter().enumerate() {
        let expected = newest - i as i32;
        assert_eq!(s, &format!("record{expected}"));
        assert_eq!(*n, expected + 100);
    }
    assert_eq!(durable.last().unwrap(), &("record1".to_string(), 101));
    Ok(())
}

#[test]
fn log_survives_reopen_and_keeps_appending() -> Result<()> {
    let (db, dir) = create_test_db()?;
    append_records(&db, 1..=10)?;
    db.log_manager().flush(10)?;
    drop(db);

    let db = Database::new(test_config(&dir))?;
    append_records(&db, 11..=12)?;

    let mut expected = 12;
    for bytes in db.log_manager().iterator()? {
        let (s, _) = parse_record(&bytes?);
        assert_eq!(s, format!("record{expected}"));
        expected -= 1;
    }
    assert_eq!(expected, 0);
    Ok(())
}
