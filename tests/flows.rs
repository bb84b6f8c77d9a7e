use tsh_analyzer::*;

mod common;
use common::*;

fn process(records: &[RecordBuilder], options: &TraceOptions) -> Result<TraceOutcome, TshError> {
    let (_dir, path) = write_trace(records);
    TraceProcessor::with_iana()
        .expect("bundled protocol table")
        .process_trace(&path, options)
}

fn flows_on() -> TraceOptions {
    TraceOptions::default().with_flow_extraction(true)
}

fn data_segment(micros: u32, seq: u32) -> RecordBuilder {
    RecordBuilder {
        seq,
        tcp_flags: ACK | PSH,
        ..Default::default()
    }
    .tcp_payload(100)
    .at(1_000, micros)
}

#[test]
fn test_three_segments_one_timestamp() {
    let records: Vec<_> = (0..3).map(|i| data_segment(5, 1000 + 100 * i)).collect();
    let outcome = process(&records, &flows_on()).expect("under threshold");
    let summary = outcome.summary();
    assert_eq!(summary.tcp.concurrent_segments, 2);
    assert_eq!(summary.interface(0).unwrap().tcp.concurrent_segments, 2);

    let flows = outcome.flows().unwrap();
    let segments = flows.segments.interface(0).unwrap();
    let stamps: Vec<&str> = segments.keys().map(SegmentStamp::as_str).collect();
    assert_eq!(stamps, vec!["0.000000", "0.0000001", "0.00000011"]);
    let seqs: Vec<u32> = segments.values().map(|s| s.sequence_number).collect();
    assert_eq!(seqs, vec![1000, 1100, 1200]);

    let key = FlowKey::from_record(
        &parse_tsh_record(&records[0].to_bytes()).unwrap().1,
    );
    assert_eq!(flows.senders.get(0, &key).unwrap().len(), 3);
}

#[test]
fn test_four_segments_one_timestamp() {
    let records: Vec<_> = (0..4).map(|i| data_segment(5, 1000 + 100 * i)).collect();
    let res = process(&records, &flows_on());
    assert!(matches!(
        res,
        Err(TshError::TooManyCollisions { interface: 0, .. })
    ));
}

#[test]
fn test_collisions_ignored_without_flows() {
    let records: Vec<_> = (0..6).map(|i| data_segment(5, 1000 + 100 * i)).collect();
    let outcome = process(&records, &TraceOptions::default()).expect("no indices");
    assert!(outcome.flows().is_none());
    assert_eq!(outcome.summary().tcp.concurrent_segments, 0);
    assert_eq!(outcome.summary().records, 6);
}

#[test]
fn test_collisions_per_interface() {
    let mut records: Vec<_> = (0..3).map(|i| data_segment(5, 1000 + 100 * i)).collect();
    let mut other = data_segment(5, 9000);
    other.interface = 1;
    records.push(other);
    let outcome = process(&records, &flows_on()).expect("collisions are per interface");
    assert_eq!(outcome.summary().tcp.concurrent_segments, 2);
    assert_eq!(outcome.summary().interface(1).unwrap().tcp.concurrent_segments, 0);
}

#[test]
fn test_pure_acks_are_not_indexed() {
    let records = vec![
        RecordBuilder::default().at(1_000, 0),
        data_segment(10, 1000),
        RecordBuilder::default().at(1_000, 10),
        RecordBuilder::default().at(1_000, 10),
        RecordBuilder::default().at(1_000, 10),
    ];
    let outcome = process(&records, &flows_on()).expect("acks share timestamps freely");
    assert_eq!(outcome.flows().unwrap().segments.len(), 1);
    assert_eq!(outcome.summary().tcp.pure_acks, 4);
}

#[test]
fn test_non_monotonic_timestamps() {
    let records = vec![
        data_segment(500, 1000),
        data_segment(900, 1100),
        data_segment(700, 1200),
    ];
    // only a warning for plain statistics
    let outcome = process(&records, &TraceOptions::default()).expect("warning only");
    let summary = outcome.summary();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.ends, 0.0004);
    assert_eq!(summary.ip.packets(Category::Total), 3);

    // fatal with flow extraction
    let res = process(&records, &flows_on());
    match res {
        Err(TshError::NonMonotonicTimestamp { previous, current }) => {
            assert_eq!(previous, 0.0004);
            assert_eq!(current, 0.0002);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_record_before_first() {
    let records = vec![data_segment(500, 1000), data_segment(100, 1100)];
    let outcome = process(&records, &TraceOptions::default()).expect("warning only");
    assert_eq!(outcome.summary().ends, 0.0);
    assert!(matches!(
        process(&records, &flows_on()),
        Err(TshError::NonMonotonicTimestamp { .. })
    ));
}

#[test]
fn test_unidirectional() {
    let records = vec![
        data_segment(0, 1000),
        data_segment(10, 1100),
        RecordBuilder::default().reversed().at(1_000, 20),
    ];
    let outcome = process(&records, &flows_on()).unwrap();
    // the reverse direction only sends acknowledgments
    assert_eq!(outcome.summary().unidirectional, Directionality::Unidirectional);

    let outcome = process(&records, &TraceOptions::default()).unwrap();
    assert_eq!(outcome.summary().unidirectional, Directionality::Unknown);
}

#[test]
fn test_bidirectional_is_sticky() {
    let records = vec![
        data_segment(0, 1000),
        data_segment(10, 2000).reversed(),
        data_segment(20, 1100),
    ];
    let outcome = process(&records, &flows_on()).unwrap();
    assert_eq!(outcome.summary().unidirectional, Directionality::Bidirectional);
    assert_eq!(outcome.flows().unwrap().senders.flow_count(), 2);
}

#[test]
fn test_reverse_on_other_interface() {
    let mut reverse = data_segment(10, 2000).reversed();
    reverse.interface = 1;
    let records = vec![data_segment(0, 1000), reverse];
    let outcome = process(&records, &flows_on()).unwrap();
    assert_eq!(outcome.summary().unidirectional, Directionality::Unidirectional);
}

#[test]
fn test_malformed_microseconds() {
    let records = vec![data_segment(0, 1000), data_segment(1_000_000, 1100)];
    let res = process(&records, &TraceOptions::default());
    assert!(matches!(
        res,
        Err(TshError::MalformedMicroseconds(1_000_000))
    ));
}

#[test]
fn test_anomalies_are_warnings() {
    let records = vec![
        // IPv6 version nibble
        RecordBuilder {
            version_ihl: 0x65,
            ..Default::default()
        }
        .at(1_000, 0),
        // IP header shorter than 20 bytes
        RecordBuilder {
            version_ihl: 0x44,
            ..Default::default()
        }
        .at(1_000, 1),
        // TCP header shorter than 20 bytes
        RecordBuilder {
            data_offset: 0x40,
            ..Default::default()
        }
        .at(1_000, 2),
        // headers longer than the packet
        RecordBuilder {
            total_length: 30,
            tcp_flags: SYN,
            ..Default::default()
        }
        .at(1_000, 3),
    ];
    let outcome = process(&records, &TraceOptions::default()).expect("warnings only");
    let summary = outcome.summary();
    assert_eq!(summary.ip.packets(Category::Total), 4);
    assert_eq!(summary.ip.packets(Category::NoIpOptions), 3);
    assert_eq!(summary.ip.packets(Category::IpOptions), 0);
    assert_eq!(summary.tcp.total_acks, 3);
    // the short IP header does not affect the TCP classification
    assert_eq!(summary.tcp.cumulative_acks, 2);
    assert_eq!(summary.tcp.pure_acks, 1);
    assert_eq!(summary.tcp.options_acks, 0);
    assert_eq!(summary.tcp.syns_with_payload, 0);
    assert_eq!(summary.tcp.syns.get(&20), Some(&1));
}

#[test]
fn test_dump_path_unwritable() {
    let records = vec![data_segment(0, 1000)];
    let (dir, path) = write_trace(&records);
    let options = TraceOptions::default().with_dump(dir.path().join("missing").join("out.dump"));
    let res = TraceProcessor::with_iana()
        .unwrap()
        .process_trace(&path, &options);
    assert!(matches!(res, Err(TshError::Io(_))));
}

#[test]
fn test_mixed_protocols() {
    let records = vec![
        RecordBuilder {
            protocol: UDP,
            total_length: 128,
            ..Default::default()
        }
        .at(1_000, 0),
        data_segment(1, 1000),
        RecordBuilder {
            protocol: 1,
            total_length: 84,
            flags_fragment: 0x2000,
            ..Default::default()
        }
        .at(1_000, 2),
    ];
    let outcome = process(&records, &TraceOptions::default()).unwrap();
    let summary = outcome.summary();
    assert_eq!(summary.transport("UDP").unwrap().bytes(Category::Total), 128);
    assert_eq!(summary.transport("TCP").unwrap().bytes(Category::Total), 140);
    let icmp = summary.transport("ICMP").unwrap();
    assert_eq!(icmp.packets(Category::MoreFragments), 1);
    assert_eq!(icmp.bytes(Category::MoreFragments), 84);
    assert_eq!(icmp.packets(Category::DontFragment), 0);
    // TCP counters only see TCP records
    assert_eq!(summary.tcp.total_acks, 1);
    assert_eq!(summary.ends, 0.000002);
}
