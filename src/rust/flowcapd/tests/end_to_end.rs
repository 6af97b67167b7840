//! Two probes receiving over loopback UDP and writing compressed files.

use fcap_config::{Compression, Config, Probe};
use fcap_flowsource::pdu::encode_pdu;
use fcap_flowsource::{FlowRecord, PduHeader};
use flowcapd::collector::Collector;
use flowcapd::container::{read_container, FileHeader, FileRecord};
use flowcapd::rotation::RunSummary;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

fn pdu(probe_octet: u8, sequence: u32) -> Vec<u8> {
    let records: Vec<FlowRecord> = (0..10u32)
        .map(|i| FlowRecord {
            src_addr: Ipv4Addr::new(10, probe_octet, 0, 1),
            dst_addr: Ipv4Addr::new(192, 0, 2, 9),
            next_hop: Ipv4Addr::UNSPECIFIED,
            input: 1,
            output: 2,
            packets: 2,
            bytes: 120,
            first: 50_000,
            last: 51_000,
            src_port: (sequence + i) as u16,
            dst_port: 443,
            tcp_flags: 0x18,
            protocol: 6,
            tos: 0,
            src_as: 0,
            dst_as: 0,
            src_mask: 24,
            dst_mask: 24,
            sys_uptime: 0,
            unix_secs: 0,
            unix_nsecs: 0,
            start_ms: 0,
            elapsed_ms: 0,
        })
        .collect();
    let header = PduHeader {
        version: 5,
        count: 10,
        sys_uptime: 60_000,
        unix_secs: 1_700_000_000,
        unix_nsecs: 0,
        flow_sequence: sequence,
        engine_type: 0,
        engine_id: 0,
        sampling_interval: 0,
    };
    encode_pdu(&header, &records)
}

/// Runs two probes, sending their PDUs alternately, and returns the
/// shutdown totals and every file written.
fn capture(max_file_size: &str) -> (RunSummary, Vec<(FileHeader, Vec<FileRecord>)>) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        destination_dir: dir.path().to_path_buf(),
        compression: Compression::Zlib,
        max_file_size: max_file_size.to_string(),
        alloc_file_size: Some("4k".to_string()),
        freespace_minimum: "0".to_string(),
        space_maximum_percent: 100.0,
        probes: vec![
            Probe::udp("edge-1", "S1", "127.0.0.1:0"),
            Probe::udp("edge-2", "S2", "127.0.0.1:0"),
        ],
        ..Config::default()
    };
    config.validate().unwrap();

    let collector = Collector::start(&config).unwrap();
    let targets: Vec<SocketAddr> = collector
        .local_addrs()
        .into_iter()
        .map(|(_, addr)| addr.unwrap())
        .collect();
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    for pdu_number in 0..3u32 {
        for (octet, addr) in targets.iter().enumerate() {
            sender.send_to(&pdu(octet as u8 + 1, pdu_number * 10), addr).unwrap();
        }
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while collector
        .snapshot()
        .iter()
        .any(|(_, stats)| stats.good_records < 30)
    {
        assert!(Instant::now() < deadline, "PDUs were not received");
        thread::sleep(Duration::from_millis(10));
    }
    for (_, stats) in collector.snapshot() {
        assert_eq!(stats.missing_records, 0);
        assert_eq!(stats.bad_packets, 0);
    }

    let total = collector.shutdown().unwrap();
    let files = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            let name = e.file_name().to_string_lossy().into_owned();
            assert!(!name.starts_with('.'), "{name} was left in progress");
            let (header, records) = read_container(&e.path()).unwrap();
            assert!(name.contains(&format!("_{}-{}.", header.sensor, header.probe)));
            (header, records)
        })
        .collect();
    (total, files)
}

/// Checks that each probe's files hold only its own records, and that
/// read in order they give back everything it was sent.
fn assert_per_probe_order(files: &[(FileHeader, Vec<FileRecord>)]) {
    for (octet, probe) in [(1u8, "edge-1"), (2, "edge-2")] {
        let mut own: Vec<&Vec<FileRecord>> = files
            .iter()
            .filter(|(header, _)| header.probe == probe)
            .map(|(_, records)| records)
            .collect();
        own.sort_by_key(|records| records[0].src_port.get());
        let ports: Vec<u16> = own.iter().flat_map(|r| r.iter().map(|r| r.src_port.get())).collect();
        assert_eq!(ports, (0..30).collect::<Vec<u16>>(), "{probe}");
        assert!(own
            .iter()
            .flat_map(|records| records.iter())
            .all(|r| r.src_addr.get() == u32::from(Ipv4Addr::new(10, octet, 0, 1))));
    }
}

#[test]
fn two_probes_capture_to_separate_files() {
    let (total, files) = capture("1m");
    assert_eq!(total.records, 60);
    assert_eq!(total.files, 2);
    assert_eq!(files.len(), 2);
    assert_per_probe_order(&files);

    for (header, records) in &files {
        assert_eq!(header.compression, Compression::Zlib);
        assert_eq!(header.version, 5);
        assert_eq!(records.len(), 30);
        assert_eq!(records[0].start_ms.get(), 1_700_000_000_000 - 60_000 + 50_000);
    }
}

#[test]
fn small_files_rotate_per_probe() {
    // 1024 bytes hold 19 records, so each probe's 30 records need two files.
    let (total, files) = capture("1k");
    assert_eq!(total.records, 60);
    assert_eq!(total.files, 4);
    assert_per_probe_order(&files);
    let mut sizes: Vec<(String, usize)> = files
        .iter()
        .map(|(header, records)| (header.probe.clone(), records.len()))
        .collect();
    sizes.sort();
    assert_eq!(
        sizes,
        vec![
            ("edge-1".to_string(), 11),
            ("edge-1".to_string(), 19),
            ("edge-2".to_string(), 11),
            ("edge-2".to_string(), 19),
        ]
    );
}

#[test]
fn missing_destination_is_a_startup_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        destination_dir: dir.path().join("absent"),
        max_file_size: "1m".to_string(),
        probes: vec![Probe::udp("edge-1", "S1", "127.0.0.1:0")],
        ..Config::default()
    };
    assert!(Collector::start(&config).is_err());
}
