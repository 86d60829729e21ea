diesel::table! {
    profiles (id) {
        id -> Uuid,
        email -> Varchar,
        full_name -> Nullable<Varchar>,
        avatar_url -> Nullable<Text>,
        role -> Varchar,
        ext -> Nullable<Varchar>,
        can_create_ticket -> Bool,
        disabled -> Bool,
        disabled_reason -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        priority -> Varchar,
        created_by -> Nullable<Uuid>,
        assigned_to -> Nullable<Uuid>,
        due_date -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        business -> Nullable<Varchar>,
        source -> Varchar,
        requester_email -> Nullable<Varchar>,
        requester_name -> Nullable<Varchar>,
        message_id -> Nullable<Varchar>,
    }
}

diesel::table! {
    ticket_assignees (ticket_id, user_id) {
        ticket_id -> Uuid,
        user_id -> Uuid,
        assigned_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author_id -> Uuid,
        body -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_attachments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        storage_path -> Text,
        file_name -> Varchar,
        mime_type -> Nullable<Varchar>,
        size_bytes -> Int8,
        uploaded_by -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    kb_articles (id) {
        id -> Uuid,
        slug -> Varchar,
        title -> Varchar,
        summary -> Nullable<Text>,
        content -> Text,
        status -> Varchar,
        tags -> Array<Text>,
        views -> Int8,
        created_by -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    task_definitions (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        assignee_id -> Uuid,
        weekdays -> Array<Int2>,
        active -> Bool,
        created_by -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    task_checks (id) {
        id -> Uuid,
        task_id -> Uuid,
        user_id -> Uuid,
        check_date -> Date,
        completed_at -> Nullable<Timestamptz>,
        note -> Nullable<Text>,
    }
}

diesel::table! {
    app_settings (key) {
        key -> Varchar,
        value -> Text,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(ticket_assignees -> tickets (ticket_id));
diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_attachments -> tickets (ticket_id));
diesel::joinable!(task_checks -> task_definitions (task_id));

diesel::allow_tables_to_appear_in_same_query!(
    profiles,
    tickets,
    ticket_assignees,
    ticket_comments,
    ticket_attachments,
    kb_articles,
    task_definitions,
    task_checks,
    app_settings,
);
