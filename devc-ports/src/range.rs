use anyhow::Result;
use std::fmt;

/// An inclusive host-port range, as written in `range:` forward specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Parses a `START-END` string into a range.
    pub fn parse(range_str: &str) -> Result<Self> {
        let Some((start_str, end_str)) = range_str.split_once('-') else {
            anyhow::bail!(
                "invalid port range '{}': expected START-END (e.g. 9000-9005)",
                range_str
            );
        };

        let start: u16 = start_str
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid start port: {}", start_str))?;
        let end: u16 = end_str
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid end port: {}", end_str))?;

        Self::new(start, end)
    }

    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start > end {
            anyhow::bail!(
                "invalid range: start ({}) must not exceed end ({})",
                start,
                end
            );
        }
        Ok(PortRange { start, end })
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    pub fn overlaps_with(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn size(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }

    /// Iterates the candidate ports in scan order.
    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_range() {
        let range = PortRange::parse("9000-9005").unwrap();
        assert_eq!(range.start, 9000);
        assert_eq!(range.end, 9005);
        assert_eq!(range.size(), 6);
    }

    #[test]
    fn parse_single_port_range() {
        let range = PortRange::parse("9000-9000").unwrap();
        assert_eq!(range.size(), 1);
    }

    #[test]
    fn parse_invalid_format() {
        assert!(PortRange::parse("9000").is_err());
        assert!(PortRange::parse("not-a-range").is_err());
        assert!(PortRange::parse("9005-9000").is_err());
    }

    #[test]
    fn overlap_detection() {
        let a = PortRange::new(3000, 3009).unwrap();
        let b = PortRange::new(3005, 3015).unwrap();
        let c = PortRange::new(3010, 3019).unwrap();

        assert!(a.overlaps_with(&b));
        assert!(b.overlaps_with(&a));
        assert!(!a.overlaps_with(&c));
    }

    #[test]
    fn contains_is_inclusive() {
        let range = PortRange::new(9000, 9005).unwrap();
        assert!(range.contains(9000));
        assert!(range.contains(9005));
        assert!(!range.contains(9006));
    }
}
