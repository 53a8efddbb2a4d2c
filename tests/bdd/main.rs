// BDD runner for every feature under bdd/features

mod steps;

use cucumber::World;
use steps::world::RubixWorld;

#[tokio::main]
async fn main() {
    rubix_monitoring::init_test_logging();

    RubixWorld::cucumber()
        .fail_on_skipped()
        .run_and_exit(concat!(env!("CARGO_MANIFEST_DIR"), "/bdd/features"))
        .await;
}
