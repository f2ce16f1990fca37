//! Text rendering of an introspected schema

use crate::types::DriverKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn to_ddl(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut line = format!("  {} {}", c.name, c.data_type);
                if !c.nullable {
                    line.push_str(" NOT NULL");
                }
                if let Some(default) = &c.default {
                    line.push_str(" DEFAULT ");
                    line.push_str(default);
                }
                line
            })
            .collect();
        if !self.primary_key.is_empty() {
            lines.push(format!("  PRIMARY KEY ({})", self.primary_key.join(", ")));
        }
        format!("CREATE TABLE {} (\n{}\n);", self.name, lines.join(",\n"))
    }
}

pub fn schema_header(kind: DriverKind) -> String {
    format!("-- {} schema", kind.label())
}

/// Header line plus one DDL block per table, blank-line separated
///
/// Blocks are sorted by table name so repeated calls are identical.
pub fn render_schema(kind: DriverKind, mut blocks: Vec<(String, String)>) -> String {
    blocks.sort_by(|a, b| a.0.cmp(&b.0));
    std::iter::once(schema_header(kind))
        .chain(blocks.into_iter().map(|(_, ddl)| ddl.trim_end().to_string()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_tables(kind: DriverKind, tables: &[TableDef]) -> String {
    render_schema(
        kind,
        tables.iter().map(|t| (t.name.clone(), t.to_ddl())).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDef {
        TableDef {
            name: "users".into(),
            columns: vec![
                ColumnDef {
                    name: "id".into(),
                    data_type: "integer".into(),
                    nullable: false,
                    default: Some("nextval('users_id_seq'::regclass)".into()),
                },
                ColumnDef {
                    name: "email".into(),
                    data_type: "character varying(255)".into(),
                    nullable: true,
                    default: None,
                },
            ],
            primary_key: vec!["id".into()],
        }
    }

    #[test]
    fn test_table_ddl() {
        assert_eq!(
            users().to_ddl(),
            "CREATE TABLE users (\n  id integer NOT NULL DEFAULT nextval('users_id_seq'::regclass),\n  email character varying(255),\n  PRIMARY KEY (id)\n);"
        );
    }

    #[test]
    fn test_render_sorts_and_separates() {
        let orders = TableDef {
            name: "orders".into(),
            columns: vec![ColumnDef {
                name: "id".into(),
                data_type: "bigint".into(),
                nullable: false,
                default: None,
            }],
            primary_key: vec![],
        };
        let text = render_tables(DriverKind::PostgreSql, &[users(), orders]);
        assert!(text.starts_with("-- PostgreSQL schema\n\nCREATE TABLE orders"));
        assert!(text.contains(");\n\nCREATE TABLE users"));
    }

    #[test]
    fn test_empty_schema_is_header_only() {
        assert_eq!(render_schema(DriverKind::MariaDb, vec![]), "-- MariaDB schema");
    }
}
