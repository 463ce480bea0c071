use skeleton_depth::data::{read_csv, read_packets, DataExporter};
use skeleton_depth::mediapipe_bridge::PosePacket;
use skeleton_depth::{DepthTracker, FilterConfig, Joint, JointObservation, MeasurementFrame, JOINT_COUNT};

fn walking_frame(t: f64) -> MeasurementFrame {
    let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
    for joint in Joint::ALL {
        let i = joint.index() as f64;
        let x = 0.05 * (i - 6.0) / 6.0;
        let y = 0.04 * (t + i).sin();
        let raw = 0.3 * (0.2 * t + i).cos();
        joints[joint.index()] = JointObservation::new(x, y, raw, raw * 0.9);
    }
    MeasurementFrame::new(joints)
}

fn recording_csv(frames: usize) -> String {
    let mut header = vec!["frame".to_string(), "timestamp".to_string()];
    for joint in Joint::ALL {
        header.extend(["x", "y", "z", "ref"].map(|axis| format!("{joint}_{axis}")));
    }
    let mut text = header.join(",");
    text.push('\n');

    for n in 0..frames {
        let mut row = vec![n.to_string(), (n as f64 / 30.0).to_string()];
        if n % 10 != 9 {
            for o in walking_frame(n as f64).observations() {
                row.extend([o.position.x, o.position.y, o.raw_depth, o.reference_depth].map(|v| v.to_string()));
            }
        } else {
            row.extend(std::iter::repeat(String::new()).take(JOINT_COUNT * 4));
        }
        text.push_str(&row.join(","));
        text.push('\n');
    }
    text
}

#[test]
fn csv_recording_replays_to_bounded_depths() {
    let frames = read_csv(recording_csv(60).as_bytes()).unwrap();
    assert_eq!(frames.len(), 60);

    let config = FilterConfig::default();
    let mut tracker = DepthTracker::new(&config).unwrap().with_features(true);
    let mut exporter = DataExporter::new(true);
    let mut previous = *tracker.depths();

    for recorded in &frames {
        let result = tracker.process_frame(recorded.measurement.as_ref(), recorded.timestamp);
        assert_eq!(result.tracking_lost, recorded.measurement.is_none());
        assert!(result.depths.iter().all(|d| d.is_finite()));
        if result.tracking_lost {
            assert_eq!(result.depths, previous);
        }
        previous = result.depths;
        exporter.add_frame(result);
    }

    let metrics = tracker.metrics();
    assert_eq!(metrics.frames_lost, 6);
    assert_eq!(metrics.frames_processed, 54);
    assert_eq!(metrics.updates_skipped, 0);

    let mut output = Vec::new();
    exporter.write_csv(&mut output).unwrap();
    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 61);
    let columns = lines[0].split(',').count();
    assert_eq!(columns, 4 + JOINT_COUNT + 3 * JOINT_COUNT + 24);
    assert!(lines.iter().all(|line| line.split(',').count() == columns));
    assert!(lines[10].contains(",true,"));
}

#[test]
fn packets_and_csv_agree() {
    let mut jsonl = String::new();
    for n in 0..5 {
        let packet = PosePacket::from_frame(&walking_frame(n as f64));
        jsonl.push_str(&serde_json::to_string(&packet).unwrap());
        jsonl.push('\n');
    }

    let from_packets = read_packets(jsonl.as_bytes()).unwrap();
    let from_csv = read_csv(recording_csv(5).as_bytes()).unwrap();

    let config = FilterConfig::default();
    let mut a = DepthTracker::new(&config).unwrap();
    let mut b = DepthTracker::new(&config).unwrap();
    for (p, c) in from_packets.iter().zip(from_csv.iter()) {
        let da = a.process_frame(p.measurement.as_ref(), 0.0).depths;
        let db = b.process_frame(c.measurement.as_ref(), 0.0).depths;
        for (x, y) in da.iter().zip(db.iter()) {
            approx::assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }
}

#[test]
fn config_file_overrides_defaults() {
    let path = std::env::temp_dir().join(format!("skeleton_depth_replay_{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "measurement_noise": 0.5, "radii": { "full_body": 1.2 } }"#).unwrap();
    let config = FilterConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.measurement_noise, 0.5);
    assert_eq!(config.radii.full_body, 1.2);
    assert_eq!(config.radii.left_shin, FilterConfig::default().radii.left_shin);
    assert!(DepthTracker::new(&config).is_ok());
}
