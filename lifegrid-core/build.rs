//! Generates the Worker and Broker service stubs.
//!
//! Messages are plain serde types carried by `protocol::JsonCodec`, so the
//! services are declared with tonic-build's manual builder and need no protoc.

use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "crate::protocol::JsonCodec";

fn method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::protocol::{}", input))
        .output_type(format!("crate::protocol::{}", output))
        .codec_path(CODEC)
        .build()
}

fn main() {
    let worker = Service::builder()
        .name("Worker")
        .package("lifegrid")
        .method(method("evolve", "Evolve", "EvolveRequest", "EvolveResponse"))
        .method(method("terminate", "Terminate", "TerminateRequest", "TerminateResponse"))
        .build();

    let broker = Service::builder()
        .name("Broker")
        .package("lifegrid")
        .method(method("start_run", "StartRun", "StartRunRequest", "StartRunResponse"))
        .method(method("query_state", "QueryState", "QueryStateRequest", "QueryStateResponse"))
        .method(method("pause", "Pause", "PauseRequest", "PauseResponse"))
        .method(method("resume", "Resume", "ResumeRequest", "ResumeResponse"))
        .method(method("quit", "Quit", "QuitRequest", "QuitResponse"))
        .build();

    Builder::new().compile(&[worker, broker]);
}
