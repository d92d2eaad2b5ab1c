mod common;

use common::{readings, rssi, temp_root, two_technology_campaign, write_campaign};
use multipos::dataset::{Dataset, DatasetConfig, TechnologyMatch};
use multipos::merge::display::MergedIndexDisplayExt;
use multipos::merge::store::load_index;
use multipos::merge::{data_merge, IndexCell};
use multipos::tables::table_file::SourceRegistry;
use multipos::tables::{Encoding, StorageLayout};
use multipos::MultiposError;

#[test]
fn duplicate_key_scenario_end_to_end() {
    let (_guard, root) = temp_root();
    let sources = write_campaign(&root, &two_technology_campaign());

    let index = data_merge(&["a", "b"], &sources, &root).unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index.columns(), vec!["ts", "point_id", "idx_a", "idx_b"]);
    let row = index.row(0).unwrap();
    assert_eq!((row.timestamp, row.point_id.as_str()), (100, "P1"));
    assert_eq!(row.cells, vec![IndexCell::Many(vec![0, 1]), IndexCell::Single(0)]);

    let layout = StorageLayout::new(root.clone());
    for encoding in Encoding::ALL {
        assert!(layout.merged_path(encoding).is_file(), "{encoding}");
    }
    assert_eq!(load_index(&layout, Encoding::Binary).unwrap(), index);
    assert_eq!(load_index(&layout, Encoding::Parquet).unwrap(), index);

    let config = DatasetConfig::builder()
        .root(root.clone())
        .technologies(["a", "b"])
        .build()
        .unwrap();
    let dataset = Dataset::new(&config).unwrap();
    let records: Vec<_> = dataset.iter().collect();
    assert_eq!(records.len(), 1);

    match records[0].reading("a") {
        Some(TechnologyMatch::Many(rows)) => assert_eq!(rssi(rows), vec![-60, -61]),
        other => panic!("expected two rows of a, got {other:?}"),
    }
    match records[0].reading("b") {
        Some(TechnologyMatch::One(row)) => assert_eq!(rssi(row), vec![-70]),
        other => panic!("expected one row of b, got {other:?}"),
    }
}

#[test]
fn text_index_renders_lists_and_scalars() {
    let (_guard, root) = temp_root();
    let sources = write_campaign(&root, &two_technology_campaign());
    data_merge(&["a", "b"], &sources, &root).unwrap();

    let text =
        std::fs::read_to_string(StorageLayout::new(root).merged_path(Encoding::Csv)).unwrap();
    assert_eq!(text, "ts,point_id,idx_a,idx_b\n100,P1,\"[0, 1]\",0\n");
}

#[test]
fn technology_without_rows_keeps_its_column() {
    let (_guard, root) = temp_root();
    let sources = write_campaign(
        &root,
        &[
            ("uwb", readings(&[5, 7], &["T01", "T02"], &[1, 2])),
            ("gnss", readings(&[], &[], &[])),
        ],
    );

    let index = data_merge(&["uwb", "gnss"], &sources, &root).unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.column("gnss").unwrap().all(IndexCell::is_empty));

    let coverage = index.coverage();
    assert_eq!(coverage[0].1.single, 2);
    assert_eq!(coverage[1].1.empty, 2);
    assert!(index.show().to_string().contains("idx_gnss"));
}

#[test]
fn merge_aborts_on_missing_or_unknown_sources() {
    let (_guard, root) = temp_root();
    let mut sources = write_campaign(&root, &two_technology_campaign());

    assert_eq!(
        data_merge(&["a", "c"], &sources, &root).unwrap_err(),
        MultiposError::UnknownSystem("c".into())
    );

    let missing = root.join("binary").join("c.arrow");
    sources.insert("c", missing.clone());
    assert_eq!(
        data_merge(&["a", "c"], &sources, &root).unwrap_err(),
        MultiposError::SourceNotFound {
            technology: "c".into(),
            location: missing.to_string()
        }
    );
    assert!(!root.join("binary").join("merged.bin").exists());
}

#[test]
fn merge_accepts_every_table_encoding() {
    let (_guard, root) = temp_root();
    write_campaign(&root, &two_technology_campaign());
    let layout = StorageLayout::new(root.clone());

    let expected = {
        let sources = SourceRegistry::from_layout(&layout, ["a", "b"], Encoding::Binary);
        data_merge(&["a", "b"], &sources, &root).unwrap()
    };
    for encoding in [Encoding::Csv, Encoding::Parquet] {
        let sources = SourceRegistry::from_layout(&layout, ["a", "b"], encoding);
        assert_eq!(data_merge(&["a", "b"], &sources, &root).unwrap(), expected, "{encoding}");
    }
}

#[test]
fn no_technologies_yields_bare_index() {
    let (_guard, root) = temp_root();
    let index = data_merge::<&str>(&[], &SourceRegistry::new(), &root).unwrap();
    assert!(index.is_empty());
    assert_eq!(index.columns(), vec!["ts", "point_id"]);
    assert_eq!(
        load_index(&StorageLayout::new(root), Encoding::Parquet)
            .unwrap()
            .columns(),
        vec!["ts", "point_id"]
    );
}
