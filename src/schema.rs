diesel::table! {
    datasets (name) {
        name -> Text,
        description -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    dataset_versions (id) {
        id -> Int4,
        dataset_name -> Text,
        version_number -> Int4,
        created_at -> Timestamptz,
        description -> Text,
    }
}

diesel::table! {
    column_definitions (id) {
        id -> Int4,
        version_id -> Int4,
        column_name -> Text,
    }
}

diesel::joinable!(dataset_versions -> datasets (dataset_name));
diesel::joinable!(column_definitions -> dataset_versions (version_id));

diesel::allow_tables_to_appear_in_same_query!(datasets, dataset_versions, column_definitions,);
