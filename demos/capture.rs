//! Synthetic capture shared by the demos: both hands open and close a pinch
//! while the right wrist rolls back and forth.

use avp_stream::{HandJoint, Mat4, RawHand, RawUpdate, IDENTITY};

fn pose(x: f64, y: f64, z: f64, roll: f64) -> Mat4 {
    let (s, c) = roll.sin_cos();
    [
        [1.0, 0.0, 0.0, x],
        [0.0, c, -s, y],
        [0.0, s, c, z],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

fn skeleton(pinch: f64) -> Vec<Mat4> {
    (0..HandJoint::COUNT)
        .map(|i| {
            if i == HandJoint::IndexFingerTip.index() {
                pose(0.08, pinch, 0.0, 0.0)
            } else {
                pose(0.02 * (i % 5) as f64, 0.0, 0.0, 0.0)
            }
        })
        .collect()
}

/// `frames` updates covering one full gesture cycle.
pub fn synthetic_capture(frames: usize) -> Vec<RawUpdate> {
    (0..frames)
        .map(|i| {
            let phase = i as f64 / frames as f64 * std::f64::consts::TAU;
            let pinch = 0.04 * (1.0 + phase.sin());
            RawUpdate {
                left: RawHand {
                    wrist: pose(-0.2, 1.1, -0.3, 0.0),
                    joints: skeleton(pinch),
                },
                right: RawHand {
                    wrist: pose(0.2, 1.1, -0.3, 0.8 * phase.cos()),
                    joints: skeleton(0.08 - pinch),
                },
                head: {
                    let mut head = IDENTITY;
                    head[1][3] = 1.6;
                    head
                },
            }
        })
        .collect()
}
