// flowbench-engine: Execution controllers for workflow runs.
// Depends on `flowbench-sdk` and `flowbench-common`.
//
// Architecture:
//   ExecutionController (trait)
//     ├─ LocalEngine  → WorkerFactory → StepWorker (subprocess | container)
//     └─ RemoteEngine → RemoteClient + background monitor
//   PostProcessingTrigger → any ExecutionController

pub mod controller;
pub mod local_engine;
pub mod post_processing;
pub mod remote;
pub mod worker;

pub use controller::ExecutionController;
pub use local_engine::LocalEngine;
pub use post_processing::{PostProcessingSpec, PostProcessingTrigger, RunLocator};
pub use remote::{HttpRemoteClient, RemoteClient, RemoteEngine};
pub use worker::{
    ContainerWorker, ExecResult, StepWorker, SubprocessWorker, WorkerFactory, WorkerKind,
    WorkerSpec,
};
