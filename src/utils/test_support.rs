/// Returns true when mock-server tests cannot run because localhost binding is denied.
pub fn mock_server_unavailable() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping mock server test: binding 127.0.0.1 is not permitted");
            true
        }
        Err(err) => panic!("failed to probe localhost for mock server tests: {err}"),
    }
}
