//! Diesel row types for the message store.

use diesel::prelude::*;

use crate::schema;

/// Message row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MessageRecord {
    pub id: String,
    pub author: String,
    pub content: String,
    pub created_at: String,
    pub is_approved: i32,
    pub is_legacy: i32,
    pub moderation: String,
    pub likes: i32,
    pub report_count: i32,
}

/// New message for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::messages)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub author: &'a str,
    pub content: &'a str,
    pub created_at: &'a str,
    pub is_approved: i32,
    pub is_legacy: i32,
    pub moderation: &'a str,
    pub likes: i32,
    pub report_count: i32,
}
