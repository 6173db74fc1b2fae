//! Prints the `RandomSecret` CRD YAML to stdout.

fn main() {
    match random_secret_controller::controller::crdgen::render() {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
