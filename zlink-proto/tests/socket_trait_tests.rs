//! Integration tests for the generic `Socket` trait API.

use bytes::Bytes;
use zlink_proto::pair::PairSocket;
use zlink_proto::{Socket, SocketType};

#[compio::test]
async fn test_socket_trait_polymorphism() {
    async fn get_socket_type<S: Socket>(socket: &S) -> SocketType {
        socket.socket_type()
    }

    let endpoint = "inproc://socket-trait-polymorphism";
    let server = PairSocket::bind_inproc(endpoint).unwrap();
    let socket_type = get_socket_type(&server).await;
    assert_eq!(socket_type, SocketType::Pair);
}

#[compio::test]
async fn test_socket_trait_send_recv_signature() {
    // Compile-time check: generic functions bounded by `Socket` accept any
    // socket type implementing it, with the signatures the trait promises.
    async fn send_message<S: Socket>(socket: &mut S, msg: Vec<Bytes>) -> std::io::Result<()> {
        socket.send(msg).await
    }

    async fn recv_message<S: Socket>(socket: &mut S) -> std::io::Result<Option<Vec<Bytes>>> {
        socket.recv().await
    }

    let endpoint = "inproc://socket-trait-send-recv";
    let mut server = PairSocket::bind_inproc(endpoint).unwrap();
    let mut client = PairSocket::connect_inproc(endpoint).unwrap();

    send_message(&mut client, vec![Bytes::from("ping")])
        .await
        .unwrap();
    let received = recv_message(&mut server).await.unwrap();
    assert_eq!(received, Some(vec![Bytes::from("ping")]));
}

#[compio::test]
async fn test_socket_trait_has_more_default() {
    let endpoint = "inproc://socket-trait-has-more";
    let server = PairSocket::bind_inproc(endpoint).unwrap();
    // PairSocket doesn't override `has_more`; the trait default is `false`.
    assert!(!server.has_more());
}
