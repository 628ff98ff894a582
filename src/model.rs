use diesel::prelude::*;
use serde::Serialize;

/// One row of the `clicks` table, as shown on the leaderboard.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::clicks)]
pub struct CountryTally {
    pub country: String,
    pub total_clicks: i64,
    pub country_code: Option<String>,
}

/// A country and its total, without the display code.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::clicks)]
pub struct CountryTotal {
    pub country: String,
    pub total_clicks: i64,
}
