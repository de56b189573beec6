use super::{describe, json_pretty, ResolveArgs, Session, EXIT_SUCCESS};
use kiln_core::PlanRequest;

pub fn run(session: &Session, args: &ResolveArgs, locked: bool) -> Result<u8, String> {
    let request = PlanRequest {
        locked,
        ..args.request(session)?
    };
    let result = session
        .engine()?
        .plan(&args.recipe, &request)
        .map_err(|e| describe(&e))?;

    if session.json {
        println!("{}", json_pretty(&result.identity)?);
    } else {
        println!("{}", result.identity.package_id);
    }
    Ok(EXIT_SUCCESS)
}
