diesel::table! {
    reminders (id) {
        id -> Integer,
        user_id -> Text,
        title -> Nullable<Text>,
        description -> Nullable<Text>,
        occurrence_time -> Nullable<BigInt>,
        is_completed -> Bool,
        is_recurring -> Bool,
        recurrence_pattern -> Text,
        recurrence_data -> Nullable<Text>,
        recurrence_end -> Nullable<BigInt>,
        created_at -> BigInt,
    }
}
