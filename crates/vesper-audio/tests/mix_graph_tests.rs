// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Full mix-step behavior: routing, soloing, metering, driver output.

use std::sync::Arc;

use approx::assert_relative_eq;
use vesper_audio::{
    db_to_linear, sample_to_i32, AudioFrame, AudioMixGraph, DriverCallback, DummyDriver,
    MIN_PEAK_DB,
};

const BUFFER_SIZE: usize = 128;
const MIX_RATE: u32 = 44100;

fn sine(frames: usize, hz: f32) -> Vec<AudioFrame> {
    (0..frames)
        .map(|i| {
            let s = (2.0 * std::f32::consts::PI * hz * i as f32 / MIX_RATE as f32).sin();
            AudioFrame::new(s, s)
        })
        .collect()
}

fn graph() -> Arc<AudioMixGraph> {
    Arc::new(AudioMixGraph::new(1, BUFFER_SIZE, MIX_RATE))
}

/// Registers a callback writing `signal` into channel 0 of the named
/// bus every step.
fn feed(g: &Arc<AudioMixGraph>, bus: &str, signal: Vec<AudioFrame>) {
    let bus = bus.to_owned();
    g.register_mix_callback(Box::new(move |w, frames| {
        let index = w.bus_index(&bus).unwrap();
        let buf = w.channel_mix_buffer(index, 0).unwrap();
        buf[..frames].copy_from_slice(&signal[..frames]);
    }));
}

fn pull_master(g: Arc<AudioMixGraph>) -> Vec<i32> {
    let mut callback = DriverCallback::new(g, Box::new(DummyDriver));
    let mut out = vec![0i32; BUFFER_SIZE * 2];
    callback.get_frames(&mut out);
    out
}

#[test]
fn solo_routes_only_the_soloed_chain_to_master() {
    let g = graph();
    g.add_bus();
    g.set_bus_name(1, "A").unwrap();
    g.set_bus_send(1, None).unwrap(); // master
    g.set_bus_volume_db(1, -6.0).unwrap();
    g.add_bus();
    g.set_bus_name(2, "B").unwrap();
    g.set_bus_send(2, Some("A")).unwrap();
    g.set_bus_solo(2, true).unwrap();

    let signal = sine(BUFFER_SIZE, 440.0);
    feed(&g, "A", signal.clone());
    feed(&g, "B", signal.clone());

    let out = pull_master(g);
    // A's own input is silenced; B passes through A and picks up A's
    // -6 dB on the way to master.
    let gain = db_to_linear(-6.0);
    for (i, frame) in signal.iter().enumerate() {
        assert_eq!(out[i * 2], sample_to_i32(frame.left * gain), "frame {i}");
        assert_eq!(out[i * 2 + 1], sample_to_i32(frame.right * gain));
    }
}

#[test]
fn sends_superpose_linearly_in_their_target() {
    let g = graph();
    g.add_bus();
    g.set_bus_name(1, "A").unwrap();
    g.set_bus_volume_db(1, -6.0).unwrap();
    g.add_bus();
    g.set_bus_name(2, "B").unwrap();
    g.set_bus_volume_db(2, -12.0).unwrap();

    let a = sine(BUFFER_SIZE, 440.0);
    let b = sine(BUFFER_SIZE, 220.0);
    feed(&g, "A", a.clone());
    feed(&g, "B", b.clone());

    let out = pull_master(g);
    let (ga, gb) = (db_to_linear(-6.0), db_to_linear(-12.0));
    for i in 0..BUFFER_SIZE {
        let expected = a[i].left * ga + b[i].left * gb;
        assert_eq!(out[i * 2], sample_to_i32(expected), "frame {i}");
    }
}

#[test]
fn solo_output_matches_muting_every_unsoloed_bus() {
    let build = |solo: bool| {
        let g = graph();
        g.add_bus();
        g.set_bus_name(1, "A").unwrap();
        g.set_bus_volume_db(1, -6.0).unwrap();
        g.add_bus();
        g.set_bus_name(2, "B").unwrap();
        g.set_bus_send(2, Some("A")).unwrap();
        g.add_bus();
        g.set_bus_name(3, "C").unwrap();
        if solo {
            g.set_bus_solo(2, true).unwrap();
        } else {
            // Mute exactly the buses whose send path has no solo.
            g.set_bus_mute(0, true).unwrap();
            g.set_bus_mute(1, true).unwrap();
            g.set_bus_mute(3, true).unwrap();
        }
        feed(&g, "A", sine(BUFFER_SIZE, 440.0));
        feed(&g, "B", sine(BUFFER_SIZE, 330.0));
        feed(&g, "C", sine(BUFFER_SIZE, 220.0));
        pull_master(g)
    };

    assert_eq!(build(true), build(false));
}

#[test]
fn invalid_send_targets_fall_through_to_master() {
    let g = graph();
    g.add_bus();
    g.set_bus_name(1, "A").unwrap();
    g.set_bus_send(1, Some("Nowhere")).unwrap();
    g.add_bus();
    g.set_bus_name(2, "B").unwrap();
    // A send naming a higher-index bus would break the mix order.
    g.set_bus_send(1, Some("B")).unwrap();

    let signal = sine(BUFFER_SIZE, 440.0);
    feed(&g, "A", signal.clone());

    g.mix_step();
    assert_eq!(g.bus_peak_volume_left_db(2, 0).unwrap(), MIN_PEAK_DB);

    // Master received A verbatim during that same step.
    let mut callback = DriverCallback::new(g, Box::new(DummyDriver));
    let mut out = vec![0i32; BUFFER_SIZE * 2];
    callback.get_frames(&mut out);
    for (i, frame) in signal.iter().enumerate() {
        assert_eq!(out[i * 2], sample_to_i32(frame.left), "frame {i}");
    }
}

#[test]
fn to_mix_counts_frames_produced_and_consumed() {
    let g = graph();
    feed(&g, "Master", sine(BUFFER_SIZE, 440.0));
    let mut callback = DriverCallback::new(g, Box::new(DummyDriver));
    assert_eq!(callback.to_mix(), 0);

    let mut out = vec![0i32; 50 * 2];
    callback.get_frames(&mut out);
    assert_eq!(callback.to_mix(), BUFFER_SIZE - 50);

    let mut out = vec![0i32; (BUFFER_SIZE - 50) * 2];
    callback.get_frames(&mut out);
    assert_eq!(callback.to_mix(), 0);

    // A pull larger than one chunk wraps into the next mix step.
    let mut out = vec![0i32; (BUFFER_SIZE + 40) * 2];
    callback.get_frames(&mut out);
    assert_eq!(callback.to_mix(), BUFFER_SIZE - 40);
}

#[test]
fn peaks_report_post_volume_levels() {
    let g = graph();
    g.add_bus();
    g.set_bus_name(1, "A").unwrap();
    g.set_bus_volume_db(1, -6.0).unwrap();
    g.register_mix_callback(Box::new(|w, _frames| {
        let buf = w.channel_mix_buffer(1, 0).unwrap();
        buf[0] = AudioFrame::new(1.0, 0.5);
    }));
    g.mix_step();

    let left = g.bus_peak_volume_left_db(1, 0).unwrap();
    let right = g.bus_peak_volume_right_db(1, 0).unwrap();
    assert_relative_eq!(left, -6.0, epsilon = 1e-3);
    assert_relative_eq!(right, -12.02, epsilon = 1e-2);
}

#[test]
fn silent_channels_deactivate_after_the_disable_window() {
    let g = graph();
    g.add_bus();
    g.set_channel_disable_time(0.0);
    assert!(!g.is_bus_channel_active(1, 0).unwrap());

    let once = std::sync::atomic::AtomicBool::new(true);
    g.register_mix_callback(Box::new(move |w, _frames| {
        if once.swap(false, std::sync::atomic::Ordering::Relaxed) {
            let buf = w.channel_mix_buffer(1, 0).unwrap();
            buf[0] = AudioFrame::new(1.0, 1.0);
        }
    }));

    g.mix_step();
    assert!(g.is_bus_channel_active(1, 0).unwrap());
    g.mix_step();
    g.mix_step();
    assert!(!g.is_bus_channel_active(1, 0).unwrap());
}
