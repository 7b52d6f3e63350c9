//! Partitioning of a contingency list into `y` contiguous slices.

use gat_core::{GatError, GatResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Slice `x` (1-based) of `y`. Over a list of `n` items it selects
/// `[(x-1)*n/y, x*n/y)`; the `y` slices tile the list exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Filtration {
    x: usize,
    y: usize,
}

impl Filtration {
    pub fn new(x: usize, y: usize) -> GatResult<Self> {
        if y < 1 {
            return Err(GatError::Validation(format!(
                "invalid partition {x}/{y}: partition count must be at least 1"
            )));
        }
        if x < 1 || x > y {
            return Err(GatError::Validation(format!(
                "invalid partition {x}/{y}: index must be between 1 and {y}"
            )));
        }
        Ok(Self { x, y })
    }

    pub fn index(&self) -> usize {
        self.x
    }

    pub fn count(&self) -> usize {
        self.y
    }

    pub fn range(&self, n: usize) -> GatResult<Range<usize>> {
        if self.y > n {
            return Err(GatError::Validation(format!(
                "invalid partition {self}: {} partitions for {n} item(s)",
                self.y
            )));
        }
        Ok((self.x - 1) * n / self.y..self.x * n / self.y)
    }

    pub fn filter<'a, T>(&self, items: &'a [T]) -> GatResult<&'a [T]> {
        Ok(&items[self.range(items.len())?])
    }
}

impl FromStr for Filtration {
    type Err = GatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GatError::Validation(format!("invalid partition '{s}': expected <x>/<y>"));
        let (x, y) = s.split_once('/').ok_or_else(invalid)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(x) || !digits(y) {
            return Err(invalid());
        }
        let x = x.parse().map_err(|_| invalid())?;
        let y = y.parse().map_err(|_| invalid())?;
        Filtration::new(x, y)
    }
}

impl fmt::Display for Filtration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.x, self.y)
    }
}

impl TryFrom<String> for Filtration {
    type Error = GatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Filtration> for String {
    fn from(value: Filtration) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_and_displays() {
        let f: Filtration = "2/3".parse().unwrap();
        assert_eq!((f.index(), f.count()), (2, 3));
        assert_eq!(f.to_string(), "2/3");
    }

    #[test]
    fn test_rejects_malformed_specs() {
        for spec in ["", "1", "a/b", "1/", "/2", "-1/2", "1/2/3", " 1/2", "0/2", "3/2", "1/0"] {
            let err = spec.parse::<Filtration>().unwrap_err();
            assert!(err.is_validation(), "{spec}: {err}");
        }
    }

    #[test]
    fn test_eleven_items_in_three_slices() {
        let ranges: Vec<_> = (1..=3)
            .map(|x| Filtration::new(x, 3).unwrap().range(11).unwrap())
            .collect();
        assert_eq!(ranges, vec![0..3, 3..7, 7..11]);
    }

    #[test]
    fn test_more_slices_than_items_is_an_error() {
        let f = Filtration::new(1, 4).unwrap();
        assert!(f.range(3).unwrap_err().is_validation());
        assert!(f.filter(&["a", "b"]).is_err());
    }

    #[test]
    fn test_filter_selects_the_slice() {
        let items = ["a", "b", "c", "d", "e"];
        assert_eq!(Filtration::new(2, 2).unwrap().filter(&items).unwrap(), &["c", "d", "e"]);
    }

    #[test]
    fn test_serde_uses_the_text_form() {
        let f = Filtration::new(1, 2).unwrap();
        assert_eq!(serde_json::to_string(&f).unwrap(), "\"1/2\"");
        assert!(serde_json::from_str::<Filtration>("\"4/2\"").is_err());
    }
}
