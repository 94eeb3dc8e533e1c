//! `sort=<key>_<asc|desc>` handling shared by every collection endpoint.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }
}

/// Sort keys every table understands, mapped to their column.
pub const COMMON_KEYS: &[(&str, &str)] = &[("id", "id"), ("created", "created_at"), ("updated", "updated_at")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: &'static str,
    pub direction: Direction,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder {
            column: "id",
            direction: Direction::Asc,
        }
    }
}

impl SortOrder {
    /// Resolves a `sort` query value against the common keys plus the
    /// table-specific ones. Unknown values fall back to id order.
    pub fn parse(value: Option<&str>, extra: &[(&'static str, &'static str)]) -> SortOrder {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return SortOrder::default();
        };

        if value == "created_date" {
            return SortOrder {
                column: "created_at",
                direction: Direction::Desc,
            };
        }

        let Some((key, suffix)) = value.rsplit_once('_') else {
            return SortOrder::default();
        };
        let Some(direction) = Direction::from_suffix(suffix) else {
            return SortOrder::default();
        };

        COMMON_KEYS
            .iter()
            .chain(extra.iter())
            .find(|(k, _)| *k == key)
            .map(|&(_, column)| SortOrder { column, direction })
            .unwrap_or_default()
    }

    /// ORDER BY clause qualified with `table`; ties break on id in the same direction.
    pub fn to_sql(&self, table: &str) -> String {
        let dir = self.direction.as_sql();
        if self.column == "id" {
            format!("ORDER BY {table}.id {dir}")
        } else {
            format!("ORDER BY {table}.{} {dir}, {table}.id {dir}", self.column)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHOR_KEYS: &[(&str, &str)] = &[("first_name", "first_name"), ("last_name", "last_name")];

    #[test]
    fn parses_common_keys() {
        assert_eq!(
            SortOrder::parse(Some("created_desc"), &[]),
            SortOrder {
                column: "created_at",
                direction: Direction::Desc
            }
        );
        assert_eq!(
            SortOrder::parse(Some("updated_asc"), &[]),
            SortOrder {
                column: "updated_at",
                direction: Direction::Asc
            }
        );
        assert_eq!(
            SortOrder::parse(Some("id_desc"), &[]),
            SortOrder {
                column: "id",
                direction: Direction::Desc
            }
        );
    }

    #[test]
    fn created_date_means_newest_first() {
        let order = SortOrder::parse(Some("created_date"), &[]);
        assert_eq!(order.column, "created_at");
        assert_eq!(order.direction, Direction::Desc);
    }

    #[test]
    fn parses_keys_containing_underscores() {
        let order = SortOrder::parse(Some("first_name_desc"), AUTHOR_KEYS);
        assert_eq!(order.column, "first_name");
        assert_eq!(order.direction, Direction::Desc);
    }

    #[test]
    fn unknown_values_fall_back_to_id() {
        assert_eq!(SortOrder::parse(None, AUTHOR_KEYS), SortOrder::default());
        assert_eq!(SortOrder::parse(Some(""), AUTHOR_KEYS), SortOrder::default());
        assert_eq!(SortOrder::parse(Some("name_asc"), AUTHOR_KEYS), SortOrder::default());
        assert_eq!(SortOrder::parse(Some("first_name_sideways"), AUTHOR_KEYS), SortOrder::default());
        assert_eq!(SortOrder::parse(Some("wat"), AUTHOR_KEYS), SortOrder::default());
    }

    #[test]
    fn renders_order_by_with_id_tiebreak() {
        let order = SortOrder::parse(Some("last_name_asc"), AUTHOR_KEYS);
        assert_eq!(order.to_sql("authors"), "ORDER BY authors.last_name ASC, authors.id ASC");
        assert_eq!(SortOrder::default().to_sql("authors"), "ORDER BY authors.id ASC");
    }
}
