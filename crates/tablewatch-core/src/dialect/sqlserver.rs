//! SQL Server (Service Broker) script rendering.
//!
//! Provisioned object set per instance:
//! - four message types (insert/update/delete plus the keepalive sentinel)
//!   and one contract
//! - one queue and one service
//! - one AFTER INSERT/UPDATE/DELETE trigger that serializes the interested
//!   columns of each affected row into a JSON body and SENDs it
//! - one dequeue procedure wrapping a timed RECEIVE
//! - the watchdog: a timer procedure that arms a conversation timer, and an
//!   activation procedure on the queue whose body is the same drop-all script
//!   teardown uses. If the consumer process disappears, the timer message
//!   activates the procedure and the whole object set is removed.

use tablewatch_commons::{SqlDataType, TableRef};

use crate::dialect::{ProvisioningStep, SqlDialect};
use crate::provision::{ObjectNames, ProvisioningPlan};

/// Script renderer for SQL Server 2012+.
#[derive(Debug, Default, Clone)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    pub fn new() -> Self {
        Self
    }
}

/// `[name]` with embedded right brackets doubled.
fn quote(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// `N'text'` literal with embedded quotes doubled.
fn nstr(text: &str) -> String {
    format!("N'{}'", text.replace('\'', "''"))
}

/// Payload expression for one column, so that the JSON body round-trips the
/// value losslessly: temporal as ISO-8601 text, decimal/money as exact
/// decimal text, binary as hex, guid as hyphenated text. Everything else
/// rides as its native JSON form.
fn payload_expr(alias: &str, name: &str, data_type: SqlDataType) -> String {
    let col = format!("{alias}.{}", quote(name));
    let quoted = quote(name);
    match data_type {
        SqlDataType::Date
        | SqlDataType::Time
        | SqlDataType::SmallDateTime
        | SqlDataType::DateTime
        | SqlDataType::DateTime2
        | SqlDataType::DateTimeOffset => {
            format!("CONVERT(VARCHAR(34), {col}, 126) AS {quoted}")
        }
        SqlDataType::Decimal => format!("CONVERT(VARCHAR(50), {col}) AS {quoted}"),
        SqlDataType::Money | SqlDataType::SmallMoney => {
            format!("CONVERT(VARCHAR(50), {col}, 2) AS {quoted}")
        }
        SqlDataType::Binary | SqlDataType::VarBinary | SqlDataType::RowVersion => {
            format!("CONVERT(VARCHAR(MAX), {col}, 2) AS {quoted}")
        }
        SqlDataType::UniqueIdentifier => format!("CONVERT(VARCHAR(36), {col}) AS {quoted}"),
        _ => format!("{col} AS {quoted}"),
    }
}

/// Comma-joined payload select list over `alias`.
fn payload_select_list(alias: &str, columns: &[(String, SqlDataType)]) -> String {
    columns
        .iter()
        .map(|(name, dt)| payload_expr(alias, name, *dt))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-row JSON document over `alias`.
fn row_json(alias: &str, columns: &[(String, SqlDataType)]) -> String {
    format!(
        "(SELECT {} FOR JSON PATH, WITHOUT_ARRAY_WRAPPER, INCLUDE_NULL_VALUES)",
        payload_select_list(alias, columns)
    )
}

fn filter_where(filter_clause: Option<&str>) -> String {
    match filter_clause {
        Some(clause) => format!(" WHERE {clause}"),
        None => String::new(),
    }
}

impl SqlDialect for SqlServerDialect {
    fn table_exists_query(&self, table: &TableRef) -> String {
        format!(
            "SELECT t.[name] AS [table_name] \
             FROM sys.tables t JOIN sys.schemas s ON t.schema_id = s.schema_id \
             WHERE s.[name] = {} AND t.[name] = {}",
            nstr(table.schema()),
            nstr(table.table()),
        )
    }

    fn column_catalog_query(&self, table: &TableRef) -> String {
        format!(
            "SELECT c.[name] AS [column_name], tp.[name] AS [server_type], \
             c.[max_length] AS [max_length] \
             FROM sys.columns c \
             JOIN sys.types tp ON c.user_type_id = tp.user_type_id \
             JOIN sys.tables t ON c.object_id = t.object_id \
             JOIN sys.schemas s ON t.schema_id = s.schema_id \
             WHERE s.[name] = {} AND t.[name] = {} \
             ORDER BY c.column_id",
            nstr(table.schema()),
            nstr(table.table()),
        )
    }

    fn provisioning_steps(
        &self,
        plan: &ProvisioningPlan,
        names: &ObjectNames,
    ) -> Vec<ProvisioningStep> {
        let mut steps = Vec::new();

        steps.push(ProvisioningStep {
            name: "message_types",
            sql: format!(
                "CREATE MESSAGE TYPE {} VALIDATION = NONE;\n\
                 CREATE MESSAGE TYPE {} VALIDATION = NONE;\n\
                 CREATE MESSAGE TYPE {} VALIDATION = NONE;\n\
                 CREATE MESSAGE TYPE {} VALIDATION = NONE;",
                quote(&names.msg_insert),
                quote(&names.msg_update),
                quote(&names.msg_delete),
                quote(&names.msg_keepalive),
            ),
        });

        steps.push(ProvisioningStep {
            name: "contract",
            sql: format!(
                "CREATE CONTRACT {} ({} SENT BY INITIATOR, {} SENT BY INITIATOR, \
                 {} SENT BY INITIATOR, {} SENT BY ANY);",
                quote(&names.contract),
                quote(&names.msg_insert),
                quote(&names.msg_update),
                quote(&names.msg_delete),
                quote(&names.msg_keepalive),
            ),
        });

        steps.push(ProvisioningStep {
            name: "queue",
            sql: format!("CREATE QUEUE [dbo].{} WITH STATUS = ON;", quote(&names.queue)),
        });

        steps.push(ProvisioningStep {
            name: "service",
            sql: format!(
                "CREATE SERVICE {} ON QUEUE [dbo].{} ({});",
                quote(&names.service),
                quote(&names.queue),
                quote(&names.contract),
            ),
        });

        steps.push(ProvisioningStep {
            name: "trigger",
            sql: self.render_trigger(plan, names),
        });

        steps.push(ProvisioningStep {
            name: "dequeue_procedure",
            sql: format!(
                "CREATE PROCEDURE [dbo].{proc} @timeout_ms INT\n\
                 AS\n\
                 BEGIN\n\
                 \tSET NOCOUNT ON;\n\
                 \tDECLARE @message_type SYSNAME, @body NVARCHAR(MAX);\n\
                 \tWAITFOR (\n\
                 \t\tRECEIVE TOP (1)\n\
                 \t\t\t@message_type = message_type_name,\n\
                 \t\t\t@body = CAST(message_body AS NVARCHAR(MAX))\n\
                 \t\tFROM [dbo].{queue}\n\
                 \t), TIMEOUT @timeout_ms;\n\
                 \tIF @message_type IS NOT NULL\n\
                 \t\tSELECT @message_type AS [message_type], @body AS [body];\n\
                 END",
                proc = quote(&names.dequeue_proc),
                queue = quote(&names.queue),
            ),
        });

        steps.push(ProvisioningStep {
            name: "watchdog_procedure",
            sql: format!(
                "CREATE PROCEDURE [dbo].{proc}\n\
                 AS\n\
                 BEGIN\n\
                 \tSET NOCOUNT ON;\n\
                 \tDECLARE @handle UNIQUEIDENTIFIER, @message_type SYSNAME;\n\
                 \tRECEIVE TOP (1) @handle = conversation_handle, \
                 @message_type = message_type_name FROM [dbo].{queue};\n\
                 \tIF @message_type = N'http://schemas.microsoft.com/SQL/ServiceBroker/DialogTimer'\n\
                 \tBEGIN\n\
                 {body}\n\
                 \tEND\n\
                 END",
                proc = quote(&names.watchdog_proc),
                queue = quote(&names.queue),
                body = self
                    .teardown_statements(names)
                    .iter()
                    .map(|s| format!("\t\t{}", s.replace('\n', "\n\t\t")))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        });

        steps.push(ProvisioningStep {
            name: "watchdog_timer",
            sql: format!(
                "CREATE PROCEDURE [dbo].{proc} @timeout_seconds INT\n\
                 AS\n\
                 BEGIN\n\
                 \tSET NOCOUNT ON;\n\
                 \tDECLARE @handle UNIQUEIDENTIFIER;\n\
                 \tSELECT TOP (1) @handle = conversation_handle\n\
                 \tFROM sys.conversation_endpoints\n\
                 \tWHERE far_service = {service} AND state NOT IN ('CD', 'ER');\n\
                 \tIF @handle IS NOT NULL\n\
                 \tBEGIN\n\
                 \t\tIF @timeout_seconds > 0\n\
                 \t\t\tBEGIN CONVERSATION TIMER (@handle) TIMEOUT = @timeout_seconds;\n\
                 \t\tELSE\n\
                 \t\t\tBEGIN CONVERSATION TIMER (@handle) TIMEOUT = 2147483;\n\
                 \tEND\n\
                 END",
                proc = quote(&names.timer_proc),
                service = nstr(&names.service),
            ),
        });

        steps.push(ProvisioningStep {
            name: "watchdog_activation",
            sql: format!(
                "ALTER QUEUE [dbo].{queue} WITH ACTIVATION (\
                 STATUS = ON, PROCEDURE_NAME = [dbo].{proc}, \
                 MAX_QUEUE_READERS = 1, EXECUTE AS OWNER);",
                queue = quote(&names.queue),
                proc = quote(&names.watchdog_proc),
            ),
        });

        steps
    }

    fn teardown_statements(&self, names: &ObjectNames) -> Vec<String> {
        let mut stmts = Vec::new();

        stmts.push(format!(
            "IF EXISTS (SELECT * FROM sys.triggers WHERE [name] = {n}) \
             DROP TRIGGER [dbo].{q};",
            n = nstr(&names.trigger),
            q = quote(&names.trigger),
        ));

        // End lingering conversations scoped to this instance's service.
        stmts.push(self.end_conversation_statement(names));

        stmts.push(format!(
            "IF EXISTS (SELECT * FROM sys.services WHERE [name] = {n}) DROP SERVICE {q};",
            n = nstr(&names.service),
            q = quote(&names.service),
        ));

        stmts.push(format!(
            "IF EXISTS (SELECT * FROM sys.service_queues WHERE [name] = {n}) \
             DROP QUEUE [dbo].{q};",
            n = nstr(&names.queue),
            q = quote(&names.queue),
        ));

        stmts.push(format!(
            "IF EXISTS (SELECT * FROM sys.service_contracts WHERE [name] = {n}) \
             DROP CONTRACT {q};",
            n = nstr(&names.contract),
            q = quote(&names.contract),
        ));

        for msg in [
            &names.msg_insert,
            &names.msg_update,
            &names.msg_delete,
            &names.msg_keepalive,
        ] {
            stmts.push(format!(
                "IF EXISTS (SELECT * FROM sys.service_message_types WHERE [name] = {n}) \
                 DROP MESSAGE TYPE {q};",
                n = nstr(msg),
                q = quote(msg),
            ));
        }

        for proc in [&names.dequeue_proc, &names.timer_proc, &names.watchdog_proc] {
            stmts.push(format!(
                "IF EXISTS (SELECT * FROM sys.procedures WHERE [name] = {n}) \
                 DROP PROCEDURE [dbo].{q};",
                n = nstr(proc),
                q = quote(proc),
            ));
        }

        stmts
    }

    fn dequeue_statement(&self, names: &ObjectNames, timeout_secs: u32) -> String {
        format!(
            "EXEC [dbo].{} @timeout_ms = {};",
            quote(&names.dequeue_proc),
            (timeout_secs as u64) * 1000,
        )
    }

    fn arm_watchdog_statement(&self, names: &ObjectNames, timeout_secs: u32) -> String {
        format!(
            "EXEC [dbo].{} @timeout_seconds = {};",
            quote(&names.timer_proc),
            timeout_secs,
        )
    }

    fn disarm_watchdog_statement(&self, names: &ObjectNames) -> String {
        format!("EXEC [dbo].{} @timeout_seconds = 0;", quote(&names.timer_proc))
    }

    fn end_conversation_statement(&self, names: &ObjectNames) -> String {
        format!(
            "DECLARE @conversation UNIQUEIDENTIFIER;\n\
             DECLARE conversation_cursor CURSOR LOCAL FAST_FORWARD FOR\n\
             \tSELECT conversation_handle FROM sys.conversation_endpoints\n\
             \tWHERE far_service = {service} AND state NOT IN ('CD');\n\
             OPEN conversation_cursor;\n\
             FETCH NEXT FROM conversation_cursor INTO @conversation;\n\
             WHILE @@FETCH_STATUS = 0\n\
             BEGIN\n\
             \tEND CONVERSATION @conversation WITH CLEANUP;\n\
             \tFETCH NEXT FROM conversation_cursor INTO @conversation;\n\
             END\n\
             CLOSE conversation_cursor;\n\
             DEALLOCATE conversation_cursor;",
            service = nstr(&names.service),
        )
    }
}

impl SqlServerDialect {
    fn render_trigger(&self, plan: &ProvisioningPlan, names: &ObjectNames) -> String {
        let new_json = row_json("i", &plan.columns);
        let old_json = row_json("d", &plan.columns);
        let del_json = row_json("d", &plan.columns);
        let filter = filter_where(plan.filter_clause.as_deref());

        let update_of_gate = match &plan.update_of {
            Some(cols) if !cols.is_empty() => {
                let checks = cols
                    .iter()
                    .map(|c| format!("UPDATE({})", quote(c)))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                format!(
                    "\n\tIF @message_type = {msg} AND NOT ({checks}) RETURN;\n",
                    msg = nstr(&names.msg_update),
                )
            }
            _ => String::new(),
        };

        let update_body = if plan.include_old_values {
            format!(
                "SELECT N'{{\"row\":' + n.[row_json] + N',\"old\":' + \
                 ISNULL(o.[row_json], N'null') + N'}}'\n\
                 \t\t\tFROM (SELECT ROW_NUMBER() OVER (ORDER BY (SELECT NULL)) AS [rn],\n\
                 \t\t\t\t{new_json} AS [row_json], i.*\n\
                 \t\t\t\tFROM inserted AS i) AS n\n\
                 \t\t\tLEFT JOIN (SELECT ROW_NUMBER() OVER (ORDER BY (SELECT NULL)) AS [rn],\n\
                 \t\t\t\t{old_json} AS [row_json]\n\
                 \t\t\t\tFROM deleted AS d) AS o ON n.[rn] = o.[rn]{filter}\n\
                 \t\t\tORDER BY n.[rn]"
            )
        } else {
            format!(
                "SELECT N'{{\"row\":' + {new_json} + N'}}'\n\
                 \t\t\tFROM inserted AS i{filter}"
            )
        };

        format!(
            "CREATE TRIGGER [dbo].{trigger} ON {table}\n\
             AFTER INSERT, UPDATE, DELETE\n\
             AS\n\
             BEGIN\n\
             \tSET NOCOUNT ON;\n\
             \n\
             \tDECLARE @inserted_count INT = (SELECT COUNT(*) FROM inserted);\n\
             \tDECLARE @deleted_count INT = (SELECT COUNT(*) FROM deleted);\n\
             \tIF @inserted_count = 0 AND @deleted_count = 0 RETURN;\n\
             \n\
             \tDECLARE @message_type SYSNAME;\n\
             \tIF @inserted_count > 0 AND @deleted_count > 0 SET @message_type = {msg_upd};\n\
             \tELSE IF @inserted_count > 0 SET @message_type = {msg_ins};\n\
             \tELSE SET @message_type = {msg_del};\n\
             {update_of_gate}\n\
             \tDECLARE @conversation UNIQUEIDENTIFIER;\n\
             \tSELECT TOP (1) @conversation = conversation_handle\n\
             \tFROM sys.conversation_endpoints\n\
             \tWHERE far_service = {service} AND state NOT IN ('CD', 'ER');\n\
             \tIF @conversation IS NULL\n\
             \tBEGIN\n\
             \t\tBEGIN DIALOG CONVERSATION @conversation\n\
             \t\t\tFROM SERVICE {service_q} TO SERVICE {service}\n\
             \t\t\tON CONTRACT {contract} WITH ENCRYPTION = OFF;\n\
             \tEND\n\
             \n\
             \tDECLARE @body NVARCHAR(MAX);\n\
             \n\
             \tIF @message_type = {msg_ins}\n\
             \tBEGIN\n\
             \t\tDECLARE row_cursor CURSOR LOCAL FAST_FORWARD FOR\n\
             \t\t\tSELECT N'{{\"row\":' + {new_json} + N'}}'\n\
             \t\t\tFROM inserted AS i{filter};\n\
             \t\tOPEN row_cursor;\n\
             \t\tFETCH NEXT FROM row_cursor INTO @body;\n\
             \t\tWHILE @@FETCH_STATUS = 0\n\
             \t\tBEGIN\n\
             \t\t\tSEND ON CONVERSATION @conversation MESSAGE TYPE {msg_ins_q} (@body);\n\
             \t\t\tFETCH NEXT FROM row_cursor INTO @body;\n\
             \t\tEND\n\
             \t\tCLOSE row_cursor; DEALLOCATE row_cursor;\n\
             \tEND\n\
             \tELSE IF @message_type = {msg_upd}\n\
             \tBEGIN\n\
             \t\tDECLARE row_cursor CURSOR LOCAL FAST_FORWARD FOR\n\
             \t\t\t{update_body};\n\
             \t\tOPEN row_cursor;\n\
             \t\tFETCH NEXT FROM row_cursor INTO @body;\n\
             \t\tWHILE @@FETCH_STATUS = 0\n\
             \t\tBEGIN\n\
             \t\t\tSEND ON CONVERSATION @conversation MESSAGE TYPE {msg_upd_q} (@body);\n\
             \t\t\tFETCH NEXT FROM row_cursor INTO @body;\n\
             \t\tEND\n\
             \t\tCLOSE row_cursor; DEALLOCATE row_cursor;\n\
             \tEND\n\
             \tELSE\n\
             \tBEGIN\n\
             \t\tDECLARE row_cursor CURSOR LOCAL FAST_FORWARD FOR\n\
             \t\t\tSELECT N'{{\"row\":' + {del_json} + N'}}'\n\
             \t\t\tFROM deleted AS d{filter};\n\
             \t\tOPEN row_cursor;\n\
             \t\tFETCH NEXT FROM row_cursor INTO @body;\n\
             \t\tWHILE @@FETCH_STATUS = 0\n\
             \t\tBEGIN\n\
             \t\t\tSEND ON CONVERSATION @conversation MESSAGE TYPE {msg_del_q} (@body);\n\
             \t\t\tFETCH NEXT FROM row_cursor INTO @body;\n\
             \t\tEND\n\
             \t\tCLOSE row_cursor; DEALLOCATE row_cursor;\n\
             \tEND\n\
             END",
            trigger = quote(&names.trigger),
            table = plan.table.qualified(),
            msg_ins = nstr(&names.msg_insert),
            msg_upd = nstr(&names.msg_update),
            msg_del = nstr(&names.msg_delete),
            msg_ins_q = quote(&names.msg_insert),
            msg_upd_q = quote(&names.msg_update),
            msg_del_q = quote(&names.msg_delete),
            service = nstr(&names.service),
            service_q = quote(&names.service),
            contract = quote(&names.contract),
            update_of_gate = update_of_gate,
            new_json = new_json,
            del_json = del_json,
            filter = filter,
            update_body = update_body,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::NamingToken;

    fn plan_with(update_of: Option<Vec<String>>, filter: Option<String>) -> ProvisioningPlan {
        ProvisioningPlan {
            table: TableRef::new("dbo", "Products"),
            columns: vec![
                ("Id".to_string(), SqlDataType::Int),
                ("Name".to_string(), SqlDataType::NVarChar),
                ("Quantity".to_string(), SqlDataType::Int),
            ],
            update_of,
            filter_clause: filter,
            include_old_values: true,
        }
    }

    fn names() -> ObjectNames {
        ObjectNames::derive(&NamingToken::from_token("deadbeef"))
    }

    #[test]
    fn test_step_order_matches_provisioning_contract() {
        let dialect = SqlServerDialect::new();
        let steps = dialect.provisioning_steps(&plan_with(None, None), &names());
        let order: Vec<&str> = steps.iter().map(|s| s.name).collect();
        assert_eq!(
            order,
            vec![
                "message_types",
                "contract",
                "queue",
                "service",
                "trigger",
                "dequeue_procedure",
                "watchdog_procedure",
                "watchdog_timer",
                "watchdog_activation",
            ]
        );
    }

    #[test]
    fn test_trigger_carries_update_of_gate() {
        let dialect = SqlServerDialect::new();
        let plan = plan_with(Some(vec!["Quantity".to_string()]), None);
        let steps = dialect.provisioning_steps(&plan, &names());
        let trigger = &steps.iter().find(|s| s.name == "trigger").unwrap().sql;
        assert!(trigger.contains("NOT (UPDATE([Quantity]))"));
    }

    #[test]
    fn test_trigger_without_update_of_has_no_gate() {
        let dialect = SqlServerDialect::new();
        let steps = dialect.provisioning_steps(&plan_with(None, None), &names());
        let trigger = &steps.iter().find(|s| s.name == "trigger").unwrap().sql;
        assert!(!trigger.contains("UPDATE(["));
    }

    #[test]
    fn test_trigger_applies_filter_to_all_dml_kinds() {
        let dialect = SqlServerDialect::new();
        let plan = plan_with(None, Some("([CategoryId] = 1)".to_string()));
        let steps = dialect.provisioning_steps(&plan, &names());
        let trigger = &steps.iter().find(|s| s.name == "trigger").unwrap().sql;
        assert_eq!(trigger.matches("WHERE ([CategoryId] = 1)").count(), 3);
    }

    #[test]
    fn test_teardown_statements_are_guarded_and_scoped() {
        let dialect = SqlServerDialect::new();
        let names = names();
        for stmt in dialect.teardown_statements(&names) {
            assert!(
                stmt.contains("IF EXISTS") || stmt.contains("conversation_cursor"),
                "unguarded teardown statement: {stmt}"
            );
            assert!(stmt.contains("deadbeef"), "statement not token-scoped: {stmt}");
        }
    }

    #[test]
    fn test_payload_expr_binary_is_hex() {
        let expr = payload_expr("i", "Stamp", SqlDataType::RowVersion);
        assert!(expr.contains("CONVERT(VARCHAR(MAX), i.[Stamp], 2)"));
    }
}
