use fleetnode_status::{FsStore, NodeStatusLog, NodeStatusLogOptions};

use crate::StatusArgs;
use crate::error::Result;

pub async fn status(args: StatusArgs) -> Result<()> {
    let log = NodeStatusLog::new(NodeStatusLogOptions {
        store: FsStore::new(&args.status_dir),
        retain: None,
    });

    let records = log.list(args.limit).await?;
    if records.is_empty() {
        eprintln!("no status records in {}", args.status_dir.display());
        return Ok(());
    }

    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }

    Ok(())
}
