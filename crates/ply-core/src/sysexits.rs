//! BSD sysexits.h exit codes (spec §6). Only the subset spec.md names
//! explicitly are used by the `plymouthd` CLI surface, but the remaining
//! standard codes are included for completeness since `ply-core::Error`
//! maps onto more categories than the CLI enumerates.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Sysexit {
    Ok = 0,
    Usage = 64,
    DataErr = 65,
    NoInput = 66,
    Unavailable = 69,
    Software = 70,
    OsErr = 71,
    OsFile = 72,
    IoErr = 74,
    Protocol = 76,
    Config = 78,
}

impl Sysexit {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl From<Sysexit> for i32 {
    fn from(value: Sysexit) -> Self {
        value.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_sysexits_h() {
        assert_eq!(Sysexit::Ok.code(), 0);
        assert_eq!(Sysexit::Usage.code(), 64);
        assert_eq!(Sysexit::OsErr.code(), 71);
        assert_eq!(Sysexit::Unavailable.code(), 69);
    }
}
