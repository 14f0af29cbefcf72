use std::fmt;
use std::time::Instant;

/// 4x4 homogeneous transform, row-major (`m[row][col]`), translation in column 3.
pub type Mat4 = [[f64; 4]; 4];

/// The 4x4 identity transform.
pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Hand chirality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Joint order of a streamed hand skeleton.
///
/// The source sends joints as an ordered list; the discriminant is the index
/// into [`RawHand::joints`].
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandJoint {
    Wrist = 0,
    ThumbKnuckle = 1,
    ThumbIntermediateBase = 2,
    ThumbIntermediateTip = 3,
    ThumbTip = 4,
    IndexFingerMetacarpal = 5,
    IndexFingerKnuckle = 6,
    IndexFingerIntermediateBase = 7,
    IndexFingerIntermediateTip = 8,
    IndexFingerTip = 9,
    MiddleFingerMetacarpal = 10,
    MiddleFingerKnuckle = 11,
    MiddleFingerIntermediateBase = 12,
    MiddleFingerIntermediateTip = 13,
    MiddleFingerTip = 14,
    RingFingerMetacarpal = 15,
    RingFingerKnuckle = 16,
    RingFingerIntermediateBase = 17,
    RingFingerIntermediateTip = 18,
    RingFingerTip = 19,
    LittleFingerMetacarpal = 20,
    LittleFingerKnuckle = 21,
    LittleFingerIntermediateBase = 22,
    LittleFingerIntermediateTip = 23,
    LittleFingerTip = 24,
}

impl HandJoint {
    /// Number of joints in a complete skeleton.
    pub const COUNT: usize = 25;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One hand as received from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHand {
    /// Wrist pose in the source (Y-up) world frame.
    pub wrist: Mat4,
    /// Joint poses relative to the wrist anchor, in [`HandJoint`] order.
    pub joints: Vec<Mat4>,
}

/// A single update from the tracking source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpdate {
    pub left: RawHand,
    pub right: RawHand,
    /// Head (device) pose in the source world frame.
    pub head: Mat4,
}

impl RawUpdate {
    pub fn hand(&self, side: Side) -> &RawHand {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// One hand after the transform pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct HandFrame {
    /// Axis-corrected wrist pose (Z-up).
    pub wrist: Mat4,
    /// Axis-corrected joint poses, same order and count as received.
    pub fingers: Vec<Mat4>,
    /// Thumb tip to index tip distance in meters.
    pub pinch_distance: f64,
    /// Wrist rotation about its local forward axis, radians in (-pi, pi].
    pub wrist_roll: f64,
}

/// Caller-facing result of processing one [`RawUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedFrame {
    pub left: HandFrame,
    pub right: HandFrame,
    /// Axis-corrected and re-oriented head pose.
    pub head: Mat4,
}

impl TransformedFrame {
    pub fn hand(&self, side: Side) -> &HandFrame {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Phase of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Acquisition loop not running.
    Disconnected,
    /// Opening the first session after start or reconnect.
    Connecting,
    /// Session open, updates flowing.
    Streaming,
    /// Backing off or re-opening after a failure.
    Reconnecting,
    /// Retry ceiling exceeded; waits for an explicit reconnect.
    GivenUp,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Disconnected => "disconnected",
            Phase::Connecting => "connecting",
            Phase::Streaming => "streaming",
            Phase::Reconnecting => "reconnecting",
            Phase::GivenUp => "given-up",
        };
        f.write_str(name)
    }
}

/// Read-only snapshot of the connection state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionState {
    pub phase: Phase,
    pub consecutive_failures: u32,
    /// Host time of the last successfully processed update.
    pub last_success: Option<Instant>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState {
            phase: Phase::Disconnected,
            consecutive_failures: 0,
            last_success: None,
        }
    }
}
