//! Contest search filters.

use std::fmt;

use swv_core::{Datum, Struct};

use crate::schema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// Contests created by one identity.
    ContestCreator,
    /// Contests weighted by one coin.
    ContestCoin,
}

impl FilterType {
    /// Wire name of the filter type.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterType::ContestCreator => "CONTEST_CREATOR",
            FilterType::ContestCoin => "CONTEST_COIN",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "CONTEST_CREATOR" => Some(FilterType::ContestCreator),
            "CONTEST_COIN" => Some(FilterType::ContestCoin),
            _ => None,
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(type, arguments)` pair of a `searchContests` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub filter_type: FilterType,
    pub arguments: Vec<String>,
}

impl Filter {
    pub fn creator(creator: impl Into<String>) -> Self {
        Self {
            filter_type: FilterType::ContestCreator,
            arguments: vec![creator.into()],
        }
    }

    /// The coin id travels as its decimal representation.
    pub fn coin(coin_id: u64) -> Self {
        Self {
            filter_type: FilterType::ContestCoin,
            arguments: vec![coin_id.to_string()],
        }
    }

    pub fn to_datum(&self) -> Datum {
        Struct::new()
            .with(schema::filter::TYPE, self.filter_type.as_str())
            .with(
                schema::filter::ARGUMENTS,
                self.arguments
                    .iter()
                    .map(String::as_str)
                    .map(Datum::from)
                    .collect::<Vec<_>>(),
            )
            .into()
    }
}
