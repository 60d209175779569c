use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use http::Method;
use micro_wire::codec::{Frame, RequestDecoder, RequestEncoder, ResponseDecoder, ResponseEncoder, Role, WsCodec, WsType};
use micro_wire::connection::Conn;
use micro_wire::protocol::{BodyItem, Request, Response};
use std::hint::black_box;
use tokio::io::{AsyncWriteExt, duplex};
use tokio_util::codec::{Decoder, Encoder};

const REQUEST: &[u8] = b"GET /index.html?page=1 HTTP/1.1\r\nHost: localhost:8080\r\nAccept: */*\r\n\
Cookie: sid=42; lang=en\r\nUser-Agent: bench\r\n\r\n";

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 12\r\n\r\nHello World!";

fn bench_request_decoder(c: &mut Criterion) {
    c.bench_function("decode_simple_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new(8080, false);
            let mut bytes = BytesMut::from(REQUEST);
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });
}

fn bench_request_encoder(c: &mut Criterion) {
    c.bench_function("encode_form_request", |b| {
        b.iter(|| {
            let mut request = Request::new(Method::POST, "http://localhost:8080/submit");
            request.push_body_item(BodyItem::KeyValue { name: "user".to_string(), value: "zava".to_string() });
            request.push_body_item(BodyItem::KeyValue { name: "note".to_string(), value: "a & b".to_string() });
            let mut bytes = BytesMut::new();
            RequestEncoder.encode(&mut request, &mut bytes).unwrap();
            black_box(bytes);
        });
    });
}

fn bench_response_codec(c: &mut Criterion) {
    c.bench_function("encode_simple_response", |b| {
        b.iter(|| {
            let mut bytes = BytesMut::new();
            ResponseEncoder::new().encode(Response::from_text("Hello World!"), &mut bytes).unwrap();
            black_box(bytes);
        });
    });

    c.bench_function("decode_simple_response", |b| {
        b.iter(|| {
            let mut bytes = BytesMut::from(RESPONSE);
            black_box(ResponseDecoder::new().decode(&mut bytes).unwrap());
        });
    });
}

fn bench_ws_codec(c: &mut Criterion) {
    let payload = vec![7u8; 4096];

    c.bench_function("ws_masked_frame_round_trip", |b| {
        b.iter(|| {
            let mut bytes = BytesMut::new();
            WsCodec::new(Role::Client).encode(Frame::new(WsType::Binary, payload.clone()), &mut bytes).unwrap();
            black_box(WsCodec::new(Role::Server).decode(&mut bytes).unwrap());
        });
    });
}

fn bench_conn_decode(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

    c.bench_function("conn_decode_pipelined_requests", |b| {
        b.to_async(&runtime).iter(|| async {
            let (client, mut server) = duplex(64 * 1024);
            let mut conn = Conn::new(client);
            for _ in 0..8 {
                server.write_all(REQUEST).await.unwrap();
            }

            let mut decoder = RequestDecoder::new(8080, false);
            for _ in 0..8 {
                black_box(conn.reader().decode(&mut decoder).await.unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_request_decoder,
    bench_request_encoder,
    bench_response_codec,
    bench_ws_codec,
    bench_conn_decode
);
criterion_main!(benches);
