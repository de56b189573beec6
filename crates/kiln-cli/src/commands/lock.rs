use super::{
    describe, json_pretty, spin_fail, spin_ok, spinner, ResolveArgs, Session, EXIT_SUCCESS,
};
use kiln_core::{lock_path_for, PlanRequest};

pub fn run(session: &Session, args: &ResolveArgs, check: bool) -> Result<u8, String> {
    let request = PlanRequest {
        locked: check,
        write_lock: !check,
        ..args.request(session)?
    };
    let engine = session.engine()?;

    let pb = if session.json {
        None
    } else {
        Some(spinner("resolving..."))
    };
    let result = match engine.plan(&args.recipe, &request) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, if check { "lock is up to date" } else { "lock written" });
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "resolution failed");
            }
            return Err(describe(&e));
        }
    };

    let lock_path = lock_path_for(&args.recipe);
    if session.json {
        let payload = serde_json::json!({
            "path": lock_path,
            "checked": check,
            "package_id": result.identity.package_id,
            "short_id": result.identity.short_id,
            "lock": result.lock_file,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{} {} ({})",
            if check { "verified" } else { "wrote" },
            lock_path.display(),
            result.identity.short_id
        );
    }
    Ok(EXIT_SUCCESS)
}
