//! # Application signals.
//!
//! [`Signal`] is the closed set of status codes describing why a runner (or the
//! whole application) stopped. Codes follow process exit-status bit patterns:
//!
//! ```text
//! SUCCESS            0b0000_0000   (0)
//! termination family 0b1000_00xx   TERMINATE(128) STOP(129) INTERRUPTED(130) KILL(131)
//! error family       0b1000_01xx   FATAL_MAIN(132) FATAL_CONTROL(133)
//!                    0b1000_10xx   FAILED_INITIALISE(137) FAILED_RELOAD(138) FAILED_FINALISE(139)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ParseSignalError;

/// Status code of a runner or of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// General: no error.
    Success,
    /// Terminated without error.
    Terminate,
    /// Terminated with an error.
    Stop,
    /// Terminated by an interruption.
    Interrupted,
    /// Terminated forcefully.
    Kill,
    /// General fatal error.
    FatalMain,
    /// The module returned an illegal control.
    FatalControl,
    /// `initialise` failed.
    FailedInitialise,
    /// `initialise` failed during a reload.
    FailedReload,
    /// `finalise` failed, even when forced.
    FailedFinalise,
}

/// Partition of [`Signal`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFamily {
    /// [`Signal::Success`].
    Success,
    /// `TERMINATE`, `STOP`, `INTERRUPTED`, `KILL`.
    Termination,
    /// `FATAL_*` and `FAILED_*`.
    Error,
}

/// Base bit shared by every non-success signal.
const TERMINATION_BASE: u8 = 0b1000_0000;

impl Signal {
    /// Every signal, in code order.
    pub const ALL: [Signal; 10] = [
        Signal::Success,
        Signal::Terminate,
        Signal::Stop,
        Signal::Interrupted,
        Signal::Kill,
        Signal::FatalMain,
        Signal::FatalControl,
        Signal::FailedInitialise,
        Signal::FailedReload,
        Signal::FailedFinalise,
    ];

    /// Returns the underlying status code.
    pub const fn code(self) -> u8 {
        match self {
            Signal::Success => 0,
            Signal::Terminate => TERMINATION_BASE,
            Signal::Stop => TERMINATION_BASE | 0b0001,
            Signal::Interrupted => TERMINATION_BASE | 0b0010,
            Signal::Kill => TERMINATION_BASE | 0b0011,
            Signal::FatalMain => TERMINATION_BASE | 0b0100,
            Signal::FatalControl => TERMINATION_BASE | 0b0101,
            Signal::FailedInitialise => TERMINATION_BASE | 0b1001,
            Signal::FailedReload => TERMINATION_BASE | 0b1010,
            Signal::FailedFinalise => TERMINATION_BASE | 0b1011,
        }
    }

    /// Returns the upper-case signal name.
    pub const fn name(self) -> &'static str {
        match self {
            Signal::Success => "SUCCESS",
            Signal::Terminate => "TERMINATE",
            Signal::Stop => "STOP",
            Signal::Interrupted => "INTERRUPTED",
            Signal::Kill => "KILL",
            Signal::FatalMain => "FATAL_MAIN",
            Signal::FatalControl => "FATAL_CONTROL",
            Signal::FailedInitialise => "FAILED_INITIALISE",
            Signal::FailedReload => "FAILED_RELOAD",
            Signal::FailedFinalise => "FAILED_FINALISE",
        }
    }

    /// Classifies the signal.
    pub const fn family(self) -> SignalFamily {
        let code = self.code();
        if code & TERMINATION_BASE == 0 {
            SignalFamily::Success
        } else if code & !TERMINATION_BASE < 0b0100 {
            SignalFamily::Termination
        } else {
            SignalFamily::Error
        }
    }

    /// True for signals of the error family.
    pub const fn is_error(self) -> bool {
        matches!(self.family(), SignalFamily::Error)
    }

    /// Process exit code for a run that ended with this signal.
    ///
    /// Success and termination-family signals are clean exits.
    pub fn exit_code(self) -> u8 {
        if self.is_error() { self.code() } else { 0 }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.code(), self.name())
    }
}

impl FromStr for Signal {
    type Err = ParseSignalError;

    /// Parses a signal name, case-insensitively (`"kill"`, `"FATAL_MAIN"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Signal::ALL
            .into_iter()
            .find(|sig| sig.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseSignalError(s.to_string()))
    }
}
