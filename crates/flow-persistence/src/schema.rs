//! Esquema Diesel (declarado manualmente). Reemplazable con `diesel
//! print-schema`.
//!
//! Tablas:
//! - `execution_records`: KV particionado `(flow_id, sort_key)` con el payload
//!   JSONB del registro (resultado de nodo o snapshot de conexiones).
//! - `flow_listeners`: última activación de UI por flow, con su stage.

diesel::table! {
    execution_records (flow_id, sort_key) {
        flow_id -> Text,
        sort_key -> Text,
        data -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    flow_listeners (flow_id) {
        flow_id -> Text,
        listener_id -> Text,
        stage -> Text,
        last_activated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(execution_records, flow_listeners,);
