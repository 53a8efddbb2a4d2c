/// Generate SQL migrations for the PostgreSQL entity store
///
/// Text columns use the "C" collation so that index order matches the byte
/// order of the shared composite index keys. Foreign keys cascade on delete,
/// which is how hard deletes reach every dependent row.
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20261001000000_initial_schema",
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT COLLATE "C" PRIMARY KEY,
                node_type TEXT NOT NULL CHECK (node_type IN ('network', 'device', 'point')),
                parent_id TEXT COLLATE "C" REFERENCES nodes(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                alive BOOLEAN NOT NULL DEFAULT TRUE,
                CONSTRAINT chk_nodes_not_own_parent CHECK (parent_id IS NULL OR parent_id <> id)
            );

            CREATE TABLE IF NOT EXISTS ports (
                id TEXT COLLATE "C" PRIMARY KEY,
                node_id TEXT COLLATE "C" NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                direction TEXT NOT NULL CHECK (direction IN ('input', 'output')),
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                alive BOOLEAN NOT NULL DEFAULT TRUE
            );

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT COLLATE "C" PRIMARY KEY,
                from_port_id TEXT COLLATE "C" NOT NULL REFERENCES ports(id) ON DELETE CASCADE,
                to_port_id TEXT COLLATE "C" NOT NULL REFERENCES ports(id) ON DELETE CASCADE,
                description TEXT NOT NULL DEFAULT '',
                alive BOOLEAN NOT NULL DEFAULT TRUE,
                CONSTRAINT chk_edges_distinct_ports CHECK (from_port_id <> to_port_id)
            );

            CREATE TABLE IF NOT EXISTS port_values (
                id TEXT COLLATE "C" PRIMARY KEY,
                port_id TEXT COLLATE "C" NOT NULL REFERENCES ports(id) ON DELETE CASCADE,
                ts TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL,
                synced BOOLEAN NOT NULL DEFAULT FALSE,
                synced_at TIMESTAMPTZ,
                alive BOOLEAN NOT NULL DEFAULT TRUE
            );

            CREATE TABLE IF NOT EXISTS tags (
                node_id TEXT COLLATE "C" NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                tag_key TEXT COLLATE "C" NOT NULL,
                tag_value TEXT COLLATE "C" NOT NULL,
                alive BOOLEAN NOT NULL DEFAULT TRUE,
                PRIMARY KEY (node_id, tag_key, tag_value)
            );
            "#,
        ),
        (
            "20261001000001_secondary_indexes",
            r#"
            -- Children of a node; roots share the empty parent key
            CREATE INDEX IF NOT EXISTS idx_nodes_parent_alive
                ON nodes ((COALESCE(parent_id, '')), alive, id);

            CREATE INDEX IF NOT EXISTS idx_ports_node_alive ON ports(node_id, alive, id);

            -- Time ordered observations per port
            CREATE INDEX IF NOT EXISTS idx_port_values_port_alive_ts
                ON port_values(port_id, alive, ts, id);

            CREATE INDEX IF NOT EXISTS idx_edges_from_alive ON edges(from_port_id, alive, id);
            CREATE INDEX IF NOT EXISTS idx_edges_to_alive ON edges(to_port_id, alive, id);

            CREATE INDEX IF NOT EXISTS idx_tags_node_alive ON tags(node_id, alive, tag_key, tag_value);

            -- Tag search
            CREATE INDEX IF NOT EXISTS idx_tags_key_value_alive
                ON tags(tag_key, tag_value, alive, node_id);
            "#,
        ),
    ]
}
