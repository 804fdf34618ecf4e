// Integration tests follow the organization suggested by Matklad:
// https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod bench;
mod flat_equivalence;
mod simulation_control;
mod simulation_scheduling;
