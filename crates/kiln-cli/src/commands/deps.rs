use super::{describe, json_pretty, load_recipe, ResolveArgs, Session, EXIT_SUCCESS};

pub fn run(session: &Session, args: &ResolveArgs) -> Result<u8, String> {
    let recipe = load_recipe(&args.recipe)?;
    let request = args.request(session)?;
    let engine = session.engine()?;
    let result = engine
        .resolve(&recipe, &request)
        .map_err(|e| describe(&e))?;

    if session.json {
        println!("{}", json_pretty(&result.dependencies)?);
    } else if result.dependencies.is_empty() {
        println!("no dependencies");
    } else {
        println!("{:<20} {:<16} {:<12} ROOT", "NAME", "CONSTRAINT", "VERSION");
        for dep in &result.dependencies {
            println!(
                "{:<20} {:<16} {:<12} {}",
                dep.name,
                dep.constraint,
                dep.version,
                dep.root.display()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
