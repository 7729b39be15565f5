use bunnydb_runner::{BunnyDbClient, Dialect, QueryOutcome, RunStatus};

const SCRIPT: &str = "
CREATE TABLE IF NOT EXISTS demo_users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
INSERT INTO demo_users (name) VALUES ('Alice');
INSER INTO demo_users (name) VALUES ('Typo');
SELECT id, name FROM demo_users;
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let db = BunnyDbClient::from_env().map_err(anyhow::Error::msg)?;

    let result = db
        .run_script(SCRIPT, Dialect::Sqlite, |progress| {
            println!(
                "[{}/{}] {}",
                progress.statement_index + 1,
                progress.total_statements,
                progress.statement_text
            );
        })
        .await?;

    for statement in &result.results {
        match &statement.outcome {
            QueryOutcome::Rows(rows) => println!(
                "#{}: {} row(s), {} affected",
                statement.order, rows.row_count, rows.stats.affected_row_count
            ),
            QueryOutcome::Error(error) => {
                eprintln!("#{}: error: {}", statement.order, error.message)
            }
        }
    }

    if let RunStatus::Aborted { order, error } = &result.status {
        eprintln!("run aborted at statement {order}: {error}");
    }
    if result.schema_changed() {
        println!("schema changed, reload cached tables");
        for table in db.table_list().await? {
            println!("table: {}", table.name);
        }
    }

    db.close().await?;
    Ok(())
}
