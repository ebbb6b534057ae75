// Kept in sync by hand with `repository::pool::SCHEMA_SQL`.

diesel::table! {
    messages (id) {
        id -> Text,
        author -> Text,
        content -> Text,
        created_at -> Text,
        is_approved -> Integer,
        is_legacy -> Integer,
        moderation -> Text,
        likes -> Integer,
        report_count -> Integer,
    }
}
