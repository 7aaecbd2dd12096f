diesel::table! {
    /// Guest links with their usage counters.
    guest_links (id) {
        /// Primary key, the public guest link identifier.
        id -> Text,

        /// Optional display text.
        label -> Nullable<Text>,

        /// Link creation timestamp.
        created -> TimestamptzSqlite,

        /// When the link stops accepting uploads. NULL means never.
        url_expires -> Nullable<TimestamptzSqlite>,

        /// File lifetime policy, JSON.
        file_lifetime -> Text,

        /// Per-file size ceiling. NULL means unlimited.
        max_file_bytes -> Nullable<BigInt>,

        /// Upload count limit. NULL means unlimited.
        max_file_uploads -> Nullable<BigInt>,

        /// Uploads recorded against the link. Only ever incremented.
        uploads_consumed -> BigInt,

        /// Operator switch.
        is_disabled -> Bool,
    }
}

diesel::table! {
    /// Files admitted through guest links.
    uploads (id) {
        /// Primary key.
        id -> Integer,

        /// Guest link the file came through. NULL once the link is deleted.
        guest_link_id -> Nullable<Text>,

        /// File size in bytes.
        size -> BigInt,

        /// Upload timestamp.
        uploaded -> TimestamptzSqlite,

        /// File expiration computed at upload time. NULL means never.
        expires -> Nullable<TimestamptzSqlite>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(guest_links, uploads);
