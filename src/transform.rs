//! Transform pipeline: source poses (Y-up) into the application frame (Z-up)
//! plus derived per-hand features.
//!
//! Everything here is pure; the acquisition loop calls [`process`] once per
//! received update.

use crate::error::StreamError;
use crate::types::{HandFrame, HandJoint, Mat4, RawHand, RawUpdate, Side, TransformedFrame};
use crate::Result;

/// Change of basis from the source's Y-up world to Z-up: (x, y, z) -> (x, -z, y).
pub const AXIS_TRANSFORM: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, -1.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Inverse of [`AXIS_TRANSFORM`] (its transpose).
pub const AXIS_TRANSFORM_INV: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Rotation of -90 degrees about local X, applied to the head pose after axis
/// correction. The device reports head orientation with its local forward
/// along -Z rather than the wrist convention.
pub const HEAD_REORIENT: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Joints the pinch distance is measured between.
pub const PINCH_JOINTS: (HandJoint, HandJoint) = (HandJoint::ThumbTip, HandJoint::IndexFingerTip);

/// Build a [`Mat4`] from the sixteen `m00..m33` scalars of a wire matrix,
/// listed row by row.
pub fn mat4_from_row_major(m: &[f32; 16]) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (i, v) in m.iter().enumerate() {
        out[i / 4][i % 4] = *v as f64;
    }
    out
}

pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

/// Translation component of a pose.
pub fn translation(m: &Mat4) -> [f64; 3] {
    [m[0][3], m[1][3], m[2][3]]
}

/// `AXIS_TRANSFORM x m`.
pub fn axis_correct(m: &Mat4) -> Mat4 {
    multiply(&AXIS_TRANSFORM, m)
}

/// Axis-correct a head pose and apply [`HEAD_REORIENT`].
pub fn correct_head(m: &Mat4) -> Mat4 {
    multiply(&axis_correct(m), &HEAD_REORIENT)
}

/// Distance between thumb tip and index tip of a skeleton.
///
/// Fails when the skeleton is too short to contain both joints; there is no
/// fallback value.
pub fn pinch_distance(joints: &[Mat4], side: Side) -> Result<f64> {
    let (a, b) = PINCH_JOINTS;
    let needed = a.index().max(b.index()) + 1;
    if joints.len() < needed {
        return Err(StreamError::malformed(
            Some(side),
            "skeleton",
            format!("{} joints, pinch distance needs at least {}", joints.len(), needed),
        ));
    }

    let p = translation(&joints[a.index()]);
    let q = translation(&joints[b.index()]);
    let d = (0..3).map(|i| (p[i] - q[i]).powi(2)).sum::<f64>().sqrt();
    Ok(d)
}

/// Roll of a wrist pose about its local forward (X) axis, in radians.
///
/// Uses the ZYX decomposition `R = Rz(yaw) * Ry(pitch) * Rx(roll)`; the bottom
/// row of `R` is independent of yaw, so roll = atan2(R21, R22).
pub fn wrist_roll(m: &Mat4) -> f64 {
    m[2][1].atan2(m[2][2])
}

fn check_finite(m: &Mat4, side: Option<Side>, field: &'static str) -> Result<()> {
    if m.iter().flatten().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(StreamError::malformed(side, field, "non-finite matrix element"))
    }
}

fn process_hand(hand: &RawHand, side: Side) -> Result<HandFrame> {
    check_finite(&hand.wrist, Some(side), "wrist")?;
    for joint in &hand.joints {
        check_finite(joint, Some(side), "skeleton")?;
    }

    let wrist = axis_correct(&hand.wrist);
    let fingers: Vec<Mat4> = hand.joints.iter().map(axis_correct).collect();
    let pinch_distance = pinch_distance(&fingers, side)?;
    let wrist_roll = wrist_roll(&wrist);

    Ok(HandFrame {
        wrist,
        fingers,
        pinch_distance,
        wrist_roll,
    })
}

/// Run the full pipeline on one update.
pub fn process(update: &RawUpdate) -> Result<TransformedFrame> {
    check_finite(&update.head, None, "head")?;
    Ok(TransformedFrame {
        left: process_hand(update.hand(Side::Left), Side::Left)?,
        right: process_hand(update.hand(Side::Right), Side::Right)?,
        head: correct_head(&update.head),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IDENTITY;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn assert_mat_eq(a: &Mat4, b: &Mat4, tol: f64) {
        for r in 0..4 {
            for c in 0..4 {
                assert!(
                    (a[r][c] - b[r][c]).abs() < tol,
                    "mismatch at [{}][{}]: {} vs {}",
                    r,
                    c,
                    a[r][c],
                    b[r][c]
                );
            }
        }
    }

    fn rot_x(a: f64) -> Mat4 {
        let (s, c) = a.sin_cos();
        [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, c, -s, 0.0],
            [0.0, s, c, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    fn rot_y(a: f64) -> Mat4 {
        let (s, c) = a.sin_cos();
        [
            [c, 0.0, s, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [-s, 0.0, c, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    fn rot_z(a: f64) -> Mat4 {
        let (s, c) = a.sin_cos();
        [
            [c, -s, 0.0, 0.0],
            [s, c, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    fn at(x: f64, y: f64, z: f64) -> Mat4 {
        let mut m = IDENTITY;
        m[0][3] = x;
        m[1][3] = y;
        m[2][3] = z;
        m
    }

    fn skeleton() -> Vec<Mat4> {
        (0..HandJoint::COUNT)
            .map(|i| at(0.01 * i as f64, 0.0, 0.0))
            .collect()
    }

    fn update() -> RawUpdate {
        RawUpdate {
            left: RawHand {
                wrist: at(-0.2, 1.0, -0.3),
                joints: skeleton(),
            },
            right: RawHand {
                wrist: multiply(&at(0.2, 1.0, -0.3), &rot_x(0.4)),
                joints: skeleton(),
            },
            head: at(0.0, 1.6, 0.0),
        }
    }

    #[test]
    fn test_axis_transform_maps_y_up_to_z_up() {
        let p = translation(&axis_correct(&at(1.0, 2.0, 3.0)));
        assert_eq!(p, [1.0, -3.0, 2.0]);
    }

    #[test]
    fn test_axis_transform_inverse_round_trip() {
        let m = multiply(&multiply(&rot_z(0.3), &rot_y(-1.1)), &at(0.5, -2.0, 7.25));
        let back = multiply(&AXIS_TRANSFORM_INV, &axis_correct(&m));
        assert_mat_eq(&back, &m, 1e-9);
        assert_mat_eq(&multiply(&AXIS_TRANSFORM, &AXIS_TRANSFORM_INV), &IDENTITY, 1e-12);
    }

    #[test]
    fn test_identity_wrist_becomes_axis_transform() {
        let mut raw = update();
        raw.left.wrist = IDENTITY;
        let frame = process(&raw).unwrap();
        assert_mat_eq(&frame.left.wrist, &AXIS_TRANSFORM, 1e-12);
    }

    #[test]
    fn test_head_is_corrected_then_reoriented() {
        let frame = process(&update()).unwrap();
        let expected = multiply(&multiply(&AXIS_TRANSFORM, &at(0.0, 1.6, 0.0)), &HEAD_REORIENT);
        assert_mat_eq(&frame.head, &expected, 1e-12);
        // Head height ends up on Z.
        assert!((translation(&frame.head)[2] - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_fingers_corrected_elementwise() {
        let raw = update();
        let frame = process(&raw).unwrap();
        assert_eq!(frame.right.fingers.len(), raw.right.joints.len());
        for (got, src) in frame.right.fingers.iter().zip(&raw.right.joints) {
            assert_mat_eq(got, &axis_correct(src), 1e-12);
        }
    }

    #[test]
    fn test_each_side_processed_from_its_own_hand() {
        let raw = update();
        let frame = process(&raw).unwrap();
        for side in [Side::Left, Side::Right] {
            let expected = axis_correct(&raw.hand(side).wrist);
            assert_mat_eq(&frame.hand(side).wrist, &expected, 1e-12);
            assert_eq!(frame.hand(side).wrist_roll, wrist_roll(&expected));
        }
        assert!((frame.hand(Side::Left).wrist_roll - frame.hand(Side::Right).wrist_roll).abs() > 0.1);
    }

    #[test]
    fn test_pinch_distance() {
        // Thumb tip at x=0.04, index tip at x=0.09.
        let d = pinch_distance(&skeleton(), Side::Left).unwrap();
        assert!((d - 0.05).abs() < 1e-12);

        let mut joints = skeleton();
        joints[HandJoint::IndexFingerTip.index()] = joints[HandJoint::ThumbTip.index()];
        assert_eq!(pinch_distance(&joints, Side::Left).unwrap(), 0.0);
    }

    #[test]
    fn test_pinch_distance_short_skeleton_is_error() {
        let joints = vec![IDENTITY, IDENTITY];
        let err = pinch_distance(&joints, Side::Right).unwrap_err();
        match err {
            StreamError::Malformed { side, field, .. } => {
                assert_eq!(side, Some(Side::Right));
                assert_eq!(field, "skeleton");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_short_skeleton_fails_whole_update() {
        let mut raw = update();
        raw.left.joints.truncate(2);
        assert!(matches!(
            process(&raw),
            Err(StreamError::Malformed { side: Some(Side::Left), .. })
        ));
    }

    #[test]
    fn test_wrist_roll_extraction() {
        assert_eq!(wrist_roll(&IDENTITY), 0.0);
        assert!((wrist_roll(&rot_x(0.7)) - 0.7).abs() < 1e-12);

        // Yaw and pitch do not leak into roll.
        let m = multiply(&multiply(&rot_z(1.2), &rot_y(-0.5)), &rot_x(-2.1));
        assert!((wrist_roll(&m) + 2.1).abs() < 1e-12);

        let flipped = rot_x(PI);
        assert!((wrist_roll(&flipped).abs() - PI).abs() < 1e-12);
    }

    #[test]
    fn test_identity_wrist_roll_after_correction() {
        let mut raw = update();
        raw.right.wrist = IDENTITY;
        let frame = process(&raw).unwrap();
        assert!((frame.right.wrist_roll - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut raw = update();
        raw.head[1][1] = f64::NAN;
        assert!(matches!(
            process(&raw),
            Err(StreamError::Malformed { side: None, field: "head", .. })
        ));

        let mut raw = update();
        raw.right.joints[3][0][3] = f64::INFINITY;
        assert!(matches!(
            process(&raw),
            Err(StreamError::Malformed { side: Some(Side::Right), field: "skeleton", .. })
        ));
    }

    #[test]
    fn test_mat4_from_row_major() {
        let flat: [f32; 16] = [
            1.0, 0.0, 0.0, 0.5, //
            0.0, 1.0, 0.0, 1.5, //
            0.0, 0.0, 1.0, -2.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let m = mat4_from_row_major(&flat);
        assert_eq!(translation(&m), [0.5, 1.5, -2.0]);
        assert_eq!(m[3][3], 1.0);
    }
}
