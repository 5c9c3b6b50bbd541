#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn run(db_path: &Path, tutors: &Path, rows: &[&str], report: &str) -> String {
    let mut journal = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        journal,
        "op,actor,role,booking,payment,tutor,subject,date,time,hours,decision,reference,outcome"
    )
    .unwrap();
    for row in rows {
        writeln!(journal, "{}", row).unwrap();
    }

    let output = Command::new(cargo_bin!("session-ledger"))
        .arg(journal.path())
        .arg("--tutors")
        .arg(tutors)
        .arg("--db-path")
        .arg(db_path)
        .arg("--report")
        .arg(report)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");
    let mut tutors = tempfile::NamedTempFile::new().unwrap();
    writeln!(tutors, "tutor,name,rate").unwrap();
    writeln!(tutors, "t1,Ada Reyes,300").unwrap();

    // 1. First run: take a booking all the way to an unpaid payout
    let stdout1 = run(
        &db_path,
        tutors.path(),
        &[
            "create_booking,s1,student,b1,,t1,Algebra,2026-11-02,14:00,2",
            "respond,t1,tutor,b1,,,,,,,accept",
            "submit_payment_proof,s1,student,b1,,,,,,,,proofs/gcash.png",
            "verify,admin,admin,b1,,,,,,,,proofs/receipt.png,confirmed",
            "submit_session_proof,t1,tutor,b1,,,,,,,,proofs/session.png",
            "create_payout,admin,admin,b1",
        ],
        "payments",
    );
    assert!(stdout1.contains("b1,payout,t1,522.00,pending,none,"));

    // 2. Second run: the alias is gone, rows come back labelled by id
    let stdout2 = run(
        &db_path,
        tutors.path(),
        &["create_booking,s2,student,b2,,t1,Physics,2026-11-03,09:00,1"],
        "bookings",
    );
    assert!(stdout2.contains("b2,s2,t1,Ada Reyes,Physics"));
    let first = stdout2
        .lines()
        .find(|line| line.contains(",s1,t1,") && line.contains(",completed,"))
        .expect("booking from the first run");
    let booking_id = first.split(',').next().unwrap().to_string();

    // 3. Third run: settle the recovered payout by booking id
    let stdout3 = run(
        &db_path,
        tutors.path(),
        &[&format!("mark_payout_paid,admin,admin,{},payout", booking_id)],
        "payments",
    );
    assert!(stdout3.contains(&format!("{},payout,t1,522.00,admin_paid,none,", booking_id)));
    assert!(stdout3.contains(&format!("{},collection,s1,600.00,confirmed,none,", booking_id)));
}
