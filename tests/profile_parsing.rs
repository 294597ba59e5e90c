use flowforge::profile::load_profiles;
use std::io::Write;

fn write_temp_csv(contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("flowforge-profile-test-{}-{}.csv", std::process::id(), contents.len()));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn parses_rows_with_header_in_any_order() {
    let csv = "DST_PORT,SRC_PORT,L4_PROTO,L3_PROTO,START_TIME,END_TIME,BYTES,PACKETS,BYTES_REV,PACKETS_REV\n\
               443,51000,6,4,0,2000,9000,12,14000,10\n";
    let path = write_temp_csv(csv);
    let rows = load_profiles(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].dst_port, 443);
    assert_eq!(rows[0].src_port, 51_000);
    assert_eq!(rows[0].packets_fwd, 12);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn rejects_row_with_no_packets() {
    let csv = "START_TIME,END_TIME,L3_PROTO,L4_PROTO,SRC_PORT,DST_PORT,PACKETS,BYTES,PACKETS_REV,BYTES_REV\n\
               0,1000,4,6,1,2,0,0,0,0\n";
    let path = write_temp_csv(csv);
    assert!(load_profiles(&path).is_err());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn skips_comment_and_blank_lines() {
    let csv = "START_TIME,END_TIME,L3_PROTO,L4_PROTO,SRC_PORT,DST_PORT,PACKETS,BYTES,PACKETS_REV,BYTES_REV\n\
               # a comment line\n\
               0,1000,4,17,1,2,3,300,0,0\n";
    let path = write_temp_csv(csv);
    let rows = load_profiles(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].l4_proto, 17);
    let _ = std::fs::remove_file(&path);
}
