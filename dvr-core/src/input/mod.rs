//! User controls: debounced button levels in, rising edges out.
//!
//! Debouncing itself belongs to the input collaborator; the control loop
//! only ever acts on rising edges computed by [`EdgeDetector`].

use crossbeam_channel::{Receiver, TryRecvError};

/// Bit set of button levels (or edges).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buttons(u8);

impl Buttons {
    pub const NONE: Buttons = Buttons(0);
    pub const PLAY: Buttons = Buttons(1 << 0);
    pub const RECORD: Buttons = Buttons(1 << 1);
    pub const STOP: Buttons = Buttons(1 << 2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Buttons) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Buttons {
    type Output = Buttons;

    fn bitor(self, rhs: Buttons) -> Buttons {
        Buttons(self.0 | rhs.0)
    }
}

impl From<Button> for Buttons {
    fn from(button: Button) -> Self {
        match button {
            Button::Play => Buttons::PLAY,
            Button::Record => Buttons::RECORD,
            Button::Stop => Buttons::STOP,
        }
    }
}

/// A single physical control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Play,
    Record,
    Stop,
}

/// Turns successive level samples into rising edges.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    previous: Buttons,
}

impl EdgeDetector {
    /// Buttons that are pressed now and were released on the previous sample.
    pub fn rising(&mut self, level: Buttons) -> Buttons {
        let edges = Buttons(level.0 & (level.0 ^ self.previous.0));
        self.previous = level;
        edges
    }
}

/// Source of debounced button levels, sampled once per control-loop iteration.
pub trait UserInput {
    fn sample(&mut self) -> Buttons;
}

/// Button presses delivered over a channel (stdin, a GUI, a test script).
///
/// Each press is reported as pressed for one sample and released on the
/// next, so repeated presses of the same button still produce edges.
#[derive(Debug)]
pub struct ChannelInput {
    rx: Receiver<Button>,
    last: Buttons,
    disconnected: bool,
}

impl ChannelInput {
    pub fn new(rx: Receiver<Button>) -> Self {
        Self {
            rx,
            last: Buttons::NONE,
            disconnected: false,
        }
    }

    /// `true` once every sender has been dropped and the queue is drained.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

impl UserInput for ChannelInput {
    fn sample(&mut self) -> Buttons {
        if !self.last.is_empty() {
            self.last = Buttons::NONE;
            return self.last;
        }
        self.last = match self.rx.try_recv() {
            Ok(button) => button.into(),
            Err(TryRecvError::Empty) => Buttons::NONE,
            Err(TryRecvError::Disconnected) => {
                self.disconnected = true;
                Buttons::NONE
            }
        };
        self.last
    }
}
