use couchdb_http::{lucene, CouchDb, Lucene};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let couch = CouchDb::from_env()?;
    let db = couch.database("library")?;
    let search = Lucene::new(&db);

    let mut pool = couch.create_request_pool();
    pool.attach(couch.active_tasks());
    pool.attach(couch.stats(&["couchdb", "open_databases"])?);
    pool.attach(db.all_docs());
    let title = format!("title:{}", lucene::escape("rust (2021)"));
    let query = pool.attach(search.query(&title, "search", "by_title")?);

    pool.send().await?;

    for (id, response) in pool.results() {
        let marker = if id == query { " (lucene)" } else { "" };
        println!(
            "{} {}{marker}: {} bytes",
            response.response_code(),
            response.response_status(),
            response.body().len()
        );
    }

    Ok(())
}
