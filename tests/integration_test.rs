use tempfile::NamedTempFile;

use minidb::pager::Pager;
use minidb::table::{self, RECORD_SIZE};

fn tmp_file() -> NamedTempFile {
    NamedTempFile::new().expect("should create a temp file")
}

fn record_filled_with(byte: u8) -> [u8; RECORD_SIZE] {
    [byte; RECORD_SIZE]
}

#[test]
fn opening_a_fresh_path_creates_a_valid_empty_file() {
    let file = tmp_file();
    let pager = Pager::open(file.path()).unwrap();
    assert_eq!(pager.page_count(), 1);
    assert_eq!(pager.page_size(), 4096);
}

#[test]
fn inserting_past_one_pages_capacity_rolls_over_to_a_second_page() {
    let file = tmp_file();
    let mut pager = Pager::open(file.path()).unwrap();
    table::create(&mut pager, 1).unwrap();

    let capacity = 31;
    let mut ids = Vec::new();
    for i in 0..capacity * 2 {
        let id = table::insert(&mut pager, 1, &record_filled_with(i as u8)).unwrap();
        ids.push(id);
    }

    for (i, id) in ids.iter().take(capacity).enumerate() {
        let (page, slot) = table::split_id(*id);
        assert_eq!(page, 1);
        assert_eq!(slot as usize, i);
    }
    for (i, id) in ids.iter().skip(capacity).enumerate() {
        let (page, slot) = table::split_id(*id);
        assert_eq!(page, 2);
        assert_eq!(slot as usize, i);
    }

    assert_eq!(ids[0], 0x0001_0000);
    assert_eq!(ids[capacity], 0x0002_0000);
    assert_eq!(pager.page_count(), 3);

    table::validate_all(&mut pager, 1).unwrap();
}

#[test]
fn get_update_delete_and_scan_agree_across_a_full_lifecycle() {
    let file = tmp_file();
    let mut pager = Pager::open(file.path()).unwrap();
    table::create(&mut pager, 1).unwrap();

    let id_a = table::insert(&mut pager, 1, &record_filled_with(1)).unwrap();
    let id_b = table::insert(&mut pager, 1, &record_filled_with(2)).unwrap();
    let id_c = table::insert(&mut pager, 1, &record_filled_with(3)).unwrap();

    assert_eq!(table::get(&mut pager, id_b).unwrap(), record_filled_with(2));

    table::update(&mut pager, id_b, &record_filled_with(20)).unwrap();
    assert_eq!(table::get(&mut pager, id_b).unwrap(), record_filled_with(20));

    table::delete(&mut pager, id_a).unwrap();
    assert_eq!(
        table::get(&mut pager, id_a).unwrap_err().code(),
        "slot_not_allocated"
    );

    let mut remaining = Vec::new();
    table::scan(&mut pager, 1, |record, id| {
        remaining.push((id, *record));
        0
    })
    .unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().any(|(id, _)| *id == id_b));
    assert!(remaining.iter().any(|(id, _)| *id == id_c));

    table::validate_all(&mut pager, 1).unwrap();
}

#[test]
fn create_refuses_to_overwrite_a_page_already_holding_records() {
    let file = tmp_file();
    let mut pager = Pager::open(file.path()).unwrap();
    table::create(&mut pager, 1).unwrap();
    table::insert(&mut pager, 1, &record_filled_with(7)).unwrap();

    let err = table::create(&mut pager, 1).unwrap_err();
    assert_eq!(err.code(), "layout");
}

#[test]
fn reopening_an_existing_database_preserves_records() {
    let file = tmp_file();
    let id = {
        let mut pager = Pager::open(file.path()).unwrap();
        table::create(&mut pager, 1).unwrap();
        table::insert(&mut pager, 1, &record_filled_with(0x99)).unwrap()
    };

    let mut pager = Pager::open(file.path()).unwrap();
    assert_eq!(table::get(&mut pager, id).unwrap(), record_filled_with(0x99));
}

#[test]
fn a_file_whose_declared_page_count_exceeds_its_length_is_rejected() {
    let file = tmp_file();
    {
        let mut pager = Pager::open(file.path()).unwrap();
        table::create(&mut pager, 1).unwrap();
    }
    let bytes = std::fs::read(file.path()).unwrap();
    std::fs::write(file.path(), &bytes[..bytes.len() - 1]).unwrap();

    let err = Pager::open(file.path()).unwrap_err();
    assert_eq!(err.code(), "truncated_file");
}

#[test]
fn a_file_with_the_wrong_declared_page_size_is_rejected() {
    use byteorder::{ByteOrder, LittleEndian};

    let file = tmp_file();
    {
        Pager::open(file.path()).unwrap();
    }
    let mut bytes = std::fs::read(file.path()).unwrap();
    LittleEndian::write_u32(&mut bytes[8..12], 2048);
    std::fs::write(file.path(), &bytes).unwrap();

    let err = Pager::open(file.path()).unwrap_err();
    assert_eq!(err.code(), "bad_pagesize");
}

#[test]
fn projection_reads_fields_back_out_of_inserted_records() {
    use byteorder::{ByteOrder, LittleEndian};
    use minidb::projection;

    let file = tmp_file();
    let mut pager = Pager::open(file.path()).unwrap();
    table::create(&mut pager, 1).unwrap();

    let mut record = [0_u8; RECORD_SIZE];
    LittleEndian::write_u32(&mut record[0..4], 1001);
    record[4..8].copy_from_slice(b"abcd");
    let id = table::insert(&mut pager, 1, &record).unwrap();

    let fields = projection::parse_schema("id:0:4:u32,tag:4:4:s").unwrap();
    let got = table::get(&mut pager, id).unwrap();
    let projected = projection::project_record(&got, &fields);
    assert_eq!(projected[0], ("id".to_string(), "1001".to_string()));
    assert_eq!(projected[1], ("tag".to_string(), "abcd".to_string()));
}
