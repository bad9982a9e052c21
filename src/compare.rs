//! Ordering of merged records drawn from different related types.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::iter::Peekable;

use crate::models::{RelatedRecord, SortDirection};

/// Natural, case-insensitive string comparison.
///
/// Runs of ASCII digits compare by numeric value, so `"item 9"` sorts
/// before `"item 10"`. When two runs are numerically equal the comparison
/// continues after them.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use tagr::compare::natural_cmp;
///
/// assert_eq!(natural_cmp("item 9", "Item 10"), Ordering::Less);
/// assert_eq!(natural_cmp("Apple", "apple"), Ordering::Equal);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().flat_map(char::to_lowercase).peekable();
    let mut right = b.chars().flat_map(char::to_lowercase).peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let l = take_digits(&mut left);
                let r = take_digits(&mut right);
                match compare_digit_runs(&l, &r) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            (Some(x), Some(y)) => {
                left.next();
                right.next();
                if x != y {
                    return x.cmp(&y);
                }
            }
        }
    }
}

fn take_digits<I: Iterator<Item = char>>(iter: &mut Peekable<I>) -> String {
    let mut run = String::new();
    while let Some(c) = iter.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}

/// Compares digit runs by value without parsing, so long runs cannot overflow.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Orders records of possibly different related types by each type's sort proxy.
///
/// The proxy map names, per related type, which accessor supplies the value
/// to compare. A record with no proxy value sorts before one with a value.
/// Ties fall back to related type then id, so the order is total and a
/// descending sort is the exact reverse of an ascending one.
#[derive(Debug, Clone)]
pub struct CrossTypeComparator {
    proxies: HashMap<String, String>,
    direction: SortDirection,
}

impl CrossTypeComparator {
    /// Creates a comparator from `related type -> proxy` pairs.
    pub fn new<I, K, V>(proxies: I, direction: SortDirection) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            proxies: proxies
                .into_iter()
                .map(|(kind, proxy)| (kind.into(), proxy.into()))
                .collect(),
            direction,
        }
    }

    /// Compares two records, honoring the configured direction.
    pub fn compare<R: RelatedRecord>(&self, a: &R, b: &R) -> Ordering {
        let ordering = match (self.proxy_value(a), self.proxy_value(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => natural_cmp(&x, &y),
        }
        .then_with(|| a.kind().cmp(b.kind()))
        .then_with(|| a.id().cmp(&b.id()));

        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }

    /// Sorts `records` in place.
    pub fn sort<R: RelatedRecord>(&self, records: &mut [R]) {
        records.sort_by(|a, b| self.compare(a, b));
    }

    fn proxy_value<R: RelatedRecord>(&self, record: &R) -> Option<String> {
        let proxy = self.proxies.get(record.kind())?;
        record.sort_value(proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Row;

    #[derive(Debug, Clone, PartialEq)]
    enum Item {
        Post { id: i64, title: Option<String> },
        Photo { id: i64, caption: String },
    }

    impl RelatedRecord for Item {
        fn from_row(_kind: &str, _key: &str, _row: &Row<'_>) -> rusqlite::Result<Self> {
            unreachable!("comparator tests build records directly")
        }

        fn kind(&self) -> &str {
            match self {
                Item::Post { .. } => "posts",
                Item::Photo { .. } => "photos",
            }
        }

        fn id(&self) -> i64 {
            match self {
                Item::Post { id, .. } | Item::Photo { id, .. } => *id,
            }
        }

        fn sort_value(&self, proxy: &str) -> Option<String> {
            match (self, proxy) {
                (Item::Post { title, .. }, "title") => title.clone(),
                (Item::Photo { caption, .. }, "caption") => Some(caption.clone()),
                (_, "id") => Some(self.id().to_string()),
                _ => None,
            }
        }
    }

    fn post(id: i64, title: &str) -> Item {
        Item::Post {
            id,
            title: Some(title.to_string()),
        }
    }

    fn photo(id: i64, caption: &str) -> Item {
        Item::Photo {
            id,
            caption: caption.to_string(),
        }
    }

    fn comparator(direction: SortDirection) -> CrossTypeComparator {
        CrossTypeComparator::new([("posts", "title"), ("photos", "caption")], direction)
    }

    #[test]
    fn natural_cmp_orders_numbers_by_value() {
        assert_eq!(natural_cmp("file2", "file10"), Ordering::Less);
        assert_eq!(natural_cmp("file10", "file2"), Ordering::Greater);
        assert_eq!(natural_cmp("v1.10", "v1.9"), Ordering::Greater);
        assert_eq!(natural_cmp("007", "7"), Ordering::Equal);
    }

    #[test]
    fn natural_cmp_ignores_case() {
        assert_eq!(natural_cmp("Banana", "apple"), Ordering::Greater);
        assert_eq!(natural_cmp("ZEBRA", "zebra"), Ordering::Equal);
    }

    #[test]
    fn natural_cmp_prefix_sorts_first() {
        assert_eq!(natural_cmp("red", "reddish"), Ordering::Less);
        assert_eq!(natural_cmp("", "a"), Ordering::Less);
    }

    #[test]
    fn natural_cmp_handles_huge_digit_runs() {
        let big = "9".repeat(40);
        let bigger = format!("1{}", "0".repeat(40));
        assert_eq!(natural_cmp(&big, &bigger), Ordering::Less);
    }

    #[test]
    fn compares_across_types_by_each_proxy() {
        let cmp = comparator(SortDirection::Ascending);
        let mut items = vec![post(1, "Zebra"), photo(1, "apple"), post(2, "mango")];

        cmp.sort(&mut items);

        assert_eq!(items, vec![photo(1, "apple"), post(2, "mango"), post(1, "Zebra")]);
    }

    #[test]
    fn descending_is_exact_reverse() {
        let mut asc = vec![
            post(1, "b"),
            post(2, "a"),
            post(3, "b"),
            photo(4, "B"),
            photo(5, "item 10"),
            photo(6, "item 9"),
        ];
        let mut desc = asc.clone();

        comparator(SortDirection::Ascending).sort(&mut asc);
        comparator(SortDirection::Descending).sort(&mut desc);

        desc.reverse();
        assert_eq!(asc, desc);
    }

    #[test]
    fn missing_proxy_value_sorts_first() {
        let cmp = comparator(SortDirection::Ascending);
        let untitled = Item::Post { id: 9, title: None };

        assert_eq!(cmp.compare(&untitled, &post(1, "a")), Ordering::Less);
        assert_eq!(cmp.compare(&post(1, "a"), &untitled), Ordering::Greater);
    }

    #[test]
    fn unmapped_type_has_no_proxy_value() {
        let cmp = CrossTypeComparator::new([("posts", "title")], SortDirection::Ascending);

        assert_eq!(cmp.compare(&photo(1, "a"), &post(1, "a")), Ordering::Less);
    }
}
