use number_prefix::{NumberPrefix, Prefix};

/// How sizes are printed in the report column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    /// Plain integer count of 1024-byte blocks, no suffix (`du -k`).
    Kibibytes,
    /// `sizeof_fmt` rendering with a unit suffix.
    Human,
}

impl SizeMode {
    pub fn from_flag(in_kibibytes: bool) -> Self {
        if in_kibibytes {
            SizeMode::Kibibytes
        } else {
            SizeMode::Human
        }
    }

    pub fn render(&self, bytes: u64) -> String {
        match self {
            SizeMode::Kibibytes => (bytes / 1024).to_string(),
            SizeMode::Human => sizeof_fmt(bytes),
        }
    }
}

// Unit label and fixed decimals for each binary prefix up to PB.
fn unit_for(prefix: Prefix) -> Option<(&'static str, usize)> {
    match prefix {
        Prefix::Kibi => Some(("kB", 0)),
        Prefix::Mebi => Some(("MB", 1)),
        Prefix::Gibi => Some(("GB", 1)),
        Prefix::Tebi => Some(("TB", 2)),
        Prefix::Pebi => Some(("PB", 2)),
        _ => None,
    }
}

/// Human friendly file size, clamped at PB.
pub fn sizeof_fmt(size: u64) -> String {
    match size {
        0 => return "0 bytes".to_string(),
        1 => return "1 byte".to_string(),
        _ => {}
    }

    match NumberPrefix::binary(size as f64) {
        NumberPrefix::Standalone(bytes) => format!("{:.0} bytes", bytes),
        NumberPrefix::Prefixed(prefix, n) => match unit_for(prefix) {
            Some((unit, decimals)) => format!("{:.*} {}", decimals, n, unit),
            None => format!("{:.2} PB", size as f64 / 1024f64.powi(5)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_one_are_special() {
        assert_eq!(sizeof_fmt(0), "0 bytes");
        assert_eq!(sizeof_fmt(1), "1 byte");
        assert_eq!(sizeof_fmt(2), "2 bytes");
        assert_eq!(sizeof_fmt(1023), "1023 bytes");
    }

    #[test]
    fn test_unit_boundaries() {
        assert_eq!(sizeof_fmt(1024), "1 kB");
        assert_eq!(sizeof_fmt(1024 * 1024), "1.0 MB");
        assert_eq!(sizeof_fmt(2_147_483_648), "2.0 GB");
        assert_eq!(sizeof_fmt(1 << 40), "1.00 TB");
        assert_eq!(sizeof_fmt(1 << 50), "1.00 PB");
    }

    #[test]
    fn test_decimals_follow_unit() {
        assert_eq!(sizeof_fmt(10 * 1024 + 100), "10 kB");
        assert_eq!(sizeof_fmt(1024 * 1024 * 3 / 2), "1.5 MB");
        assert_eq!(sizeof_fmt((1 << 40) + (1 << 39)), "1.50 TB");
    }

    #[test]
    fn test_clamps_at_petabytes() {
        assert_eq!(sizeof_fmt(1 << 60), "1024.00 PB");
        assert_eq!(sizeof_fmt(u64::MAX), "16384.00 PB");
    }

    #[test]
    fn test_kibibyte_mode_truncates() {
        let mode = SizeMode::from_flag(true);
        assert_eq!(mode.render(2_147_483_648), "2097152");
        assert_eq!(mode.render(2047), "1");
        assert_eq!(mode.render(1023), "0");
        assert_eq!(SizeMode::from_flag(false).render(2_147_483_648), "2.0 GB");
    }
}
