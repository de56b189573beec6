use super::{json_pretty, Session, EXIT_SUCCESS};
use kiln_schema::{PackageReference, VersionConstraint};
use kiln_store::{PackageIndex, PackageRecord, StoreLayout, StoreLock};

fn open(session: &Session) -> Result<(PackageIndex, StoreLock), String> {
    let layout = StoreLayout::new(&session.store);
    layout
        .initialize()
        .map_err(|e| format!("store error: {e}"))?;
    let lock = StoreLock::acquire(&layout.lock_file()).map_err(|e| format!("store lock: {e}"))?;
    Ok((PackageIndex::new(layout), lock))
}

fn exact_reference(raw: &str) -> Result<(String, String), String> {
    let reference = PackageReference::parse(raw).map_err(|e| format!("store error: {e}"))?;
    match reference.constraint {
        VersionConstraint::Exact(version) => Ok((reference.name, version)),
        VersionConstraint::Range { raw, .. } => Err(format!(
            "store error: '{raw}' is a range; an exact version is required"
        )),
    }
}

pub fn add(
    session: &Session,
    reference: &str,
    description: Option<&str>,
    libs: &[String],
    include_dirs: &[String],
) -> Result<u8, String> {
    let (name, version) = exact_reference(reference)?;
    let (index, _lock) = open(session)?;

    let mut record = PackageRecord::new(&name, &version);
    record.description = description.map(str::to_owned);
    record.libs = libs.to_vec();
    record.include_dirs = include_dirs.to_vec();
    let dir = index
        .put(&record)
        .map_err(|e| format!("store error: {e}"))?;

    if session.json {
        let payload = serde_json::json!({
            "status": "added",
            "package": record.reference(),
            "root": dir,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("added {} at {}", record.reference(), dir.display());
    }
    Ok(EXIT_SUCCESS)
}

pub fn list(session: &Session) -> Result<u8, String> {
    let layout = StoreLayout::new(&session.store);
    let records = if layout.is_initialized() {
        layout
            .verify_version()
            .map_err(|e| format!("store error: {e}"))?;
        PackageIndex::new(layout)
            .list()
            .map_err(|e| format!("store error: {e}"))?
    } else {
        Vec::new()
    };

    if session.json {
        println!("{}", json_pretty(&records)?);
    } else if records.is_empty() {
        println!("no packages in {}", session.store.display());
    } else {
        println!("{:<20} {:<12} {:<14} DESCRIPTION", "NAME", "VERSION", "PACKAGE_ID");
        for record in &records {
            let short_id = record
                .package_id
                .as_deref()
                .map_or("", |id| id.get(..12).unwrap_or(id));
            println!(
                "{:<20} {:<12} {:<14} {}",
                record.name,
                record.version,
                short_id,
                record.description.as_deref().unwrap_or("")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn remove(session: &Session, reference: &str) -> Result<u8, String> {
    let (name, version) = exact_reference(reference)?;
    let (index, _lock) = open(session)?;
    index
        .remove(&name, &version)
        .map_err(|e| format!("store error: {e}"))?;

    if session.json {
        let payload = serde_json::json!({
            "status": "removed",
            "package": format!("{name}/{version}"),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("removed {name}/{version}");
    }
    Ok(EXIT_SUCCESS)
}
