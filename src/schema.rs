diesel::table! {
    clicks (country) {
        country -> Text,
        total_clicks -> Int8,
        country_code -> Nullable<Text>,
    }
}
