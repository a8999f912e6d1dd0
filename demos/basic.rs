use couchdb_http::CouchDb;
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let couch = CouchDb::from_env()?;

    let welcome: Value = couch.root().send_and_decode().await?;
    println!("server: {welcome}");

    couch.create_db("demo_basic")?.send().await?;
    let db = couch.database("demo_basic")?;

    let saved: Value = db
        .save_document(&json!({"_id": "kit", "kind": "cat"}))?
        .send_and_decode()
        .await?;
    println!("saved: {saved}");

    let doc: Value = db.fetch_document("kit")?.send_and_decode().await?;
    println!("fetched: {doc}");

    couch.delete_db("demo_basic")?.send().await?;
    Ok(())
}
