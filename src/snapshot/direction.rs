use std::fmt;

/// Marks a log line as inbound request or outbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub const fn arrow(self) -> &'static str {
        match self {
            Direction::Request => "-->",
            Direction::Response => "<--",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arrow())
    }
}
