use std::collections::VecDeque;

use dataeng::cli::commands::preview::{
    self, PreviewArgs, PreviewBody, PreviewCommand, PreviewCommandFailure, RowsArgs, SelectArgs,
};
use dataeng::config::WorkspaceTarget;
use dataeng::pipeline::RowLimit;
use dataeng::session::{Binding, QueryResult, Session, SessionError, Statement};
use serde_json::{Value, json};

#[derive(Default)]
struct ScriptedSession {
    responses: VecDeque<Result<QueryResult, SessionError>>,
    statements: Vec<Statement>,
}

impl ScriptedSession {
    fn respond(mut self, result: QueryResult) -> Self {
        self.responses.push_back(Ok(result));
        self
    }

    fn fail(mut self, error: SessionError) -> Self {
        self.responses.push_back(Err(error));
        self
    }
}

impl Session for ScriptedSession {
    fn execute(&mut self, statement: &Statement) -> Result<QueryResult, SessionError> {
        self.statements.push(statement.clone());
        self.responses
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::Decode("unscripted statement".to_string())))
    }
}

fn tracker(rows: &[[&str; 7]]) -> QueryResult {
    QueryResult {
        columns: [
            "PIPELINE_ID",
            "DATA_SOURCE_TYPE",
            "TABLE_NAME",
            "STAGE_NAME",
            "FILE_FORMAT_NAME",
            "STATUS",
            "CREATED_AT",
        ]
        .iter()
        .map(|column| (*column).to_string())
        .collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|value| json!(value)).collect())
            .collect(),
    }
}

fn one_pipeline() -> QueryResult {
    tracker(&[[
        "pipeline_orders_s3",
        "S3",
        "ORDERS_EXT",
        "ORDERS_STAGE",
        "CSV_FMT",
        "SUCCESS",
        "1771977600.000000000",
    ]])
}

fn rows(columns: &[&str], values: &[&[&str]]) -> QueryResult {
    QueryResult {
        columns: columns.iter().map(|column| (*column).to_string()).collect(),
        rows: values
            .iter()
            .map(|row| row.iter().map(|value| json!(value)).collect())
            .collect(),
    }
}

fn table(limit: u32) -> PreviewCommand {
    PreviewCommand::Table(RowsArgs {
        select: SelectArgs { pipeline: None },
        limit: RowLimit::new(limit).expect("limit should be in range"),
    })
}

fn stage(limit: u32) -> PreviewCommand {
    PreviewCommand::Stage(RowsArgs {
        select: SelectArgs { pipeline: None },
        limit: RowLimit::new(limit).expect("limit should be in range"),
    })
}

#[test]
fn empty_tracker_never_queries_table_or_stage() {
    let commands = [
        PreviewCommand::Pipelines,
        PreviewCommand::Show(SelectArgs { pipeline: None }),
        table(100),
        PreviewCommand::Files(SelectArgs { pipeline: None }),
        stage(100),
    ];

    for command in commands {
        let mut session = ScriptedSession::default().respond(tracker(&[]));
        let outcome = preview::execute(&command, &mut session, &WorkspaceTarget::default());

        assert_eq!(session.statements.len(), 1, "{}", command.envelope_command());
        assert!(outcome.is_ok());
        assert_eq!(outcome.body, PreviewBody::NoPipelines);

        let text = preview::render_text(&outcome);
        assert!(text.contains("No pipelines found."), "{text}");
        assert!(text.contains("next: dataeng agent chat"), "{text}");
    }
}

#[test]
fn tracker_listing_is_scoped_and_newest_first() {
    let mut session = ScriptedSession::default().respond(one_pipeline());
    let outcome = preview::execute(
        &PreviewCommand::Pipelines,
        &mut session,
        &WorkspaceTarget::default(),
    );

    let sql = &session.statements[0].sql;
    assert!(sql.contains("FROM LEILA_APP.PUBLIC.DATA_PIPELINE_TRACKER"), "{sql}");
    assert!(sql.ends_with("ORDER BY CREATED_AT DESC"), "{sql}");
    match outcome.body {
        PreviewBody::Pipelines(records) => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].created_at, "2026-02-25T00:00:00Z");
        }
        other => panic!("expected pipelines, got {other:?}"),
    }
}

#[test]
fn table_query_binds_table_name_and_inlines_limit() {
    let mut session = ScriptedSession::default()
        .respond(one_pipeline())
        .respond(rows(&["ID", "AMOUNT"], &[&["1", "9.50"], &["2", "3.10"]]));

    let outcome = preview::execute(&table(50), &mut session, &WorkspaceTarget::default());

    assert!(outcome.is_ok());
    assert_eq!(session.statements.len(), 2);
    let statement = &session.statements[1];
    assert_eq!(statement.sql, "SELECT * FROM IDENTIFIER(?) LIMIT 50");
    assert_eq!(
        statement.bindings,
        vec![Binding::Text("LEILA_APP.PUBLIC.ORDERS_EXT".to_string())]
    );
    assert_eq!(outcome.row_count(), Some(2));

    let text = preview::render_text(&outcome);
    assert!(text.contains("External Table: ORDERS_EXT"), "{text}");
    assert!(text.contains("Found 2 rows"), "{text}");
}

#[test]
fn stage_query_reads_positional_columns_with_file_format() {
    let mut session = ScriptedSession::default()
        .respond(one_pipeline())
        .respond(rows(&["$1", "$2", "$3"], &[&["a", "b", "c"]]));

    let outcome = preview::execute(&stage(50), &mut session, &WorkspaceTarget::default());

    let sql = &session.statements[1].sql;
    assert!(sql.starts_with("SELECT $1, $2, $3,"), "{sql}");
    assert!(sql.contains("$22, $23 FROM @LEILA_APP.PUBLIC.ORDERS_STAGE"), "{sql}");
    assert!(sql.contains("(FILE_FORMAT => 'LEILA_APP.PUBLIC.CSV_FMT')"), "{sql}");
    assert!(sql.ends_with("LIMIT 50"), "{sql}");

    match &outcome.body {
        PreviewBody::StageRows(preview) => {
            let info = preview.column_info.as_ref().expect("column info should be present");
            assert_eq!(info.count, 3);
            assert_eq!(info.names, vec!["$1", "$2", "$3"]);
        }
        other => panic!("expected stage rows, got {other:?}"),
    }
    assert!(preview::render_text(&outcome).contains("Total columns: 3"));
}

#[test]
fn unknown_pipeline_selector_lists_available_ids() {
    let mut session = ScriptedSession::default().respond(one_pipeline());
    let command = PreviewCommand::Show(SelectArgs {
        pipeline: Some("pipeline_missing".to_string()),
    });

    let outcome = preview::execute(&command, &mut session, &WorkspaceTarget::default());

    assert_eq!(session.statements.len(), 1);
    let failure = outcome.failure.expect("selection should fail");
    assert_eq!(failure.code, "pipeline_not_found");
    assert!(failure.message.contains("pipeline_orders_s3"), "{}", failure.message);
}

#[test]
fn unsafe_stage_name_is_rejected_before_any_stage_statement() {
    let mut session = ScriptedSession::default().respond(tracker(&[[
        "pipeline_bad",
        "S3",
        "ORDERS_EXT",
        "ORDERS_STAGE; DROP TABLE X",
        "CSV_FMT",
        "FAILED",
        "1771977600.000000000",
    ]]));

    let outcome = preview::execute(
        &PreviewCommand::Files(SelectArgs { pipeline: None }),
        &mut session,
        &WorkspaceTarget::default(),
    );

    assert_eq!(session.statements.len(), 1);
    let failure = outcome.failure.expect("identifier should be rejected");
    assert_eq!(failure.code, "identifier_rejected");
    assert!(failure.message.starts_with("Error listing files:"), "{}", failure.message);
}

#[test]
fn table_failure_suggests_stage_and_exits_as_preview_failure() {
    let mut session = ScriptedSession::default()
        .respond(one_pipeline())
        .fail(SessionError::Statement {
            code: "002003".to_string(),
            sql_state: "42S02".to_string(),
            message: "Object 'ORDERS_EXT' does not exist".to_string(),
            statement_handle: None,
        });
    let args = PreviewArgs {
        json: false,
        command: table(100),
    };
    let mut out = Vec::new();

    let error = preview::run(&args, &mut session, &WorkspaceTarget::default(), &mut out)
        .expect_err("table failure should surface");

    let failure = error
        .downcast_ref::<PreviewCommandFailure>()
        .expect("failure should be typed");
    assert_eq!(failure.code, "table_query_failed");

    let text = String::from_utf8(out).expect("output should be utf-8");
    assert!(text.contains("error: Error querying table: SQL error 002003"), "{text}");
    assert!(text.contains("dataeng preview stage"), "{text}");
}

#[test]
fn empty_table_is_a_warning_not_a_failure() {
    let mut session = ScriptedSession::default()
        .respond(one_pipeline())
        .respond(rows(&["ID"], &[]));
    let args = PreviewArgs {
        json: true,
        command: table(10),
    };
    let mut out = Vec::new();

    preview::run(&args, &mut session, &WorkspaceTarget::default(), &mut out)
        .expect("empty result should not fail");

    let envelope: Value = serde_json::from_slice(&out).expect("envelope should be json");
    assert_eq!(envelope["ok"], json!(true));
    assert_eq!(envelope["command"], json!("preview.table"));
    assert_eq!(envelope["meta"]["row_limit"], json!(10));
    assert_eq!(envelope["meta"]["row_count"], json!(0));
    assert_eq!(envelope["meta"]["pipeline_id"], json!("pipeline_orders_s3"));
    assert_eq!(envelope["warnings"][0]["code"], json!("empty_result"));
    assert_eq!(envelope["warnings"][1]["code"], json!("hint"));
}

#[test]
fn listing_failure_is_rendered_as_loading_error() {
    let mut session = ScriptedSession::default().fail(SessionError::Http {
        status: 403,
        body: "forbidden".to_string(),
    });

    let outcome = preview::execute(
        &PreviewCommand::Pipelines,
        &mut session,
        &WorkspaceTarget::default(),
    );

    let failure = outcome.failure.expect("listing should fail");
    assert_eq!(failure.code, "pipelines_unavailable");
    assert_eq!(
        failure.message,
        "Error loading pipelines: unexpected HTTP status 403: forbidden"
    );
}

#[test]
fn empty_stage_listing_and_stage_query_are_warnings() {
    let commands = [PreviewCommand::Files(SelectArgs { pipeline: None }), stage(10)];
    let messages = ["No files found in stage", "No data returned from stage"];

    for (command, message) in commands.into_iter().zip(messages) {
        let mut session = ScriptedSession::default()
            .respond(one_pipeline())
            .respond(rows(&["name", "size"], &[]));

        let outcome = preview::execute(&command, &mut session, &WorkspaceTarget::default());

        assert!(outcome.is_ok(), "{}", command.envelope_command());
        assert_eq!(outcome.failure, None);
        assert_eq!(outcome.row_count(), Some(0));
        assert_eq!(outcome.notices.len(), 1);
        assert_eq!(outcome.notices[0].code, "empty_result");
        assert_eq!(outcome.notices[0].message, message);
        assert_eq!(outcome.notices[0].details, Some(json!({ "object": "ORDERS_STAGE" })));
        assert!(preview::render_text(&outcome).contains(message));
    }
}

#[test]
fn json_failure_carries_statement_details_and_hint() {
    let mut session = ScriptedSession::default()
        .respond(one_pipeline())
        .fail(SessionError::Statement {
            code: "002003".to_string(),
            sql_state: "42S02".to_string(),
            message: "Object 'ORDERS_EXT' does not exist".to_string(),
            statement_handle: Some("01b3".to_string()),
        });
    let args = PreviewArgs {
        json: true,
        command: table(100),
    };
    let mut out = Vec::new();

    preview::run(&args, &mut session, &WorkspaceTarget::default(), &mut out)
        .expect_err("table failure should surface");

    let envelope: Value = serde_json::from_slice(&out).expect("envelope should be json");
    assert_eq!(envelope["ok"], json!(false));
    assert_eq!(envelope["error"]["code"], json!("table_query_failed"));
    assert_eq!(
        envelope["error"]["details"],
        json!({"sql_code": "002003", "sql_state": "42S02", "statement_handle": "01b3"})
    );
    assert_eq!(envelope["warnings"][0]["code"], json!("hint"));
    assert!(envelope["warnings"][0].get("details").is_none());
}

#[test]
fn unknown_selector_details_list_available_ids() {
    let mut session = ScriptedSession::default().respond(one_pipeline());
    let command = PreviewCommand::Show(SelectArgs {
        pipeline: Some("pipeline_missing".to_string()),
    });

    let outcome = preview::execute(&command, &mut session, &WorkspaceTarget::default());
    let envelope = preview::to_envelope(&outcome);

    let details = envelope
        .error
        .and_then(|error| error.details)
        .expect("selection failure should carry details");
    assert_eq!(
        details,
        json!({"selector": "pipeline_missing", "available": ["pipeline_orders_s3"]})
    );
}
