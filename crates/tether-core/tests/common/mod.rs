pub mod sse_server;
