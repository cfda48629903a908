/*!
# Projection pipeline tests

End-to-end coverage of the projection operator running as a real task:
guard suppression, `*` expansion, order preservation, and tolerance of
unrecognised message bodies.
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use rowbridge::rowbridge::sql::ast::{BinaryOperator, Column, Expr, SqlSelect};
use rowbridge::rowbridge::sql::execution::message::{
    ContextReader, ContextSimple, ContextUrlValues, Message, SqlDriverMessageMap,
};
use rowbridge::rowbridge::sql::execution::processors::Projection;
use rowbridge::rowbridge::sql::execution::types::Value;
use rowbridge::rowbridge::sql::execution::Pipeline;

fn row_message(id: u64, pairs: &[(&str, Value)]) -> Message {
    let col_index: HashMap<String, usize> = pairs
        .iter()
        .enumerate()
        .map(|(i, (k, _))| (k.to_string(), i))
        .collect();
    let values = pairs.iter().map(|(_, v)| v.clone()).collect();
    Message::Row(SqlDriverMessageMap::new(id, values, Arc::new(col_index)))
}

async fn collect(rx: &mut mpsc::Receiver<Message>) -> Vec<ContextSimple> {
    let mut out = Vec::new();
    while let Some(msg) = rx.recv().await {
        match msg {
            Message::Simple(ctx) => out.push(ctx),
            other => panic!("projection emitted unexpected body {}", other.body_name()),
        }
    }
    out
}

#[tokio::test]
async fn test_projection_with_guard_end_to_end() {
    // SELECT a, b IF a = 0 — the guard is false for a=1, so only a survives
    let sql = SqlSelect::new(vec![
        Column::new("a", 0, 0),
        Column::new("b", 1, 1).with_guard(Expr::BinaryOp {
            left: Box::new(Expr::Column("a".to_string())),
            op: BinaryOperator::Equal,
            right: Box::new(Expr::Literal(Value::Int(0))),
        }),
    ]);

    let (tx, rx) = mpsc::channel(8);
    let mut projection = Projection::new(sql);
    projection.set_input(rx);
    let mut out = projection.take_output().unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(projection));

    tx.send(row_message(1, &[("a", Value::Int(1)), ("b", Value::Int(2))]))
        .await
        .unwrap();
    drop(tx);

    let run = tokio::spawn(pipeline.run());
    let results = collect(&mut out).await;
    run.await.unwrap().unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get("a"), Some(Value::Int(1)));
    assert_eq!(results[0].get("b"), None);
    assert_eq!(results[0].data().len(), 1);
}

#[tokio::test]
async fn test_projection_star_identity() {
    // SELECT * reproduces the input row contents
    let sql = SqlSelect::new(vec![Column::star()]);

    let (tx, rx) = mpsc::channel(8);
    let mut projection = Projection::new(sql);
    projection.set_input(rx);
    let mut out = projection.take_output().unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(projection));

    let input = [("x", Value::String("hi".into())), ("y", Value::Int(7))];
    tx.send(row_message(1, &input)).await.unwrap();
    drop(tx);

    let run = tokio::spawn(pipeline.run());
    let results = collect(&mut out).await;
    run.await.unwrap().unwrap();

    assert_eq!(results.len(), 1);
    let row = results[0].row();
    assert_eq!(row.len(), 2);
    assert_eq!(row.get("x"), Some(&Value::String("hi".into())));
    assert_eq!(row.get("y"), Some(&Value::Int(7)));
}

#[tokio::test]
async fn test_projection_preserves_input_order() {
    let sql = SqlSelect::new(vec![Column::new("n", 0, 0)]);

    let (tx, rx) = mpsc::channel(8);
    let mut projection = Projection::new(sql);
    projection.set_input(rx);
    let mut out = projection.take_output().unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(projection));

    for i in 0..20 {
        tx.send(row_message(i, &[("n", Value::Int(i as i64))]))
            .await
            .unwrap();
    }
    drop(tx);

    let run = tokio::spawn(pipeline.run());
    let results = collect(&mut out).await;
    run.await.unwrap().unwrap();

    let ns: Vec<i64> = results
        .iter()
        .map(|ctx| match ctx.get("n") {
            Some(Value::Int(i)) => i,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    assert_eq!(ns, (0..20).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_projection_accepts_url_values_body() {
    let sql = SqlSelect::new(vec![Column::star()]);

    let (tx, rx) = mpsc::channel(8);
    let mut projection = Projection::new(sql);
    projection.set_input(rx);
    let mut out = projection.take_output().unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(projection));

    let data = HashMap::from([
        ("name".to_string(), vec!["ann".to_string()]),
        (
            "tags".to_string(),
            vec!["a".to_string(), "b".to_string()],
        ),
    ]);
    tx.send(Message::Url(ContextUrlValues::new(data)))
        .await
        .unwrap();
    drop(tx);

    let run = tokio::spawn(pipeline.run());
    let results = collect(&mut out).await;
    run.await.unwrap().unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get("name"), Some(Value::String("ann".into())));
    assert_eq!(
        results[0].get("tags"),
        Some(Value::Strings(vec!["a".into(), "b".into()]))
    );
}

#[tokio::test]
async fn test_projection_drops_unknown_body_and_continues() {
    let sql = SqlSelect::new(vec![Column::new("a", 0, 0)]);

    let (tx, rx) = mpsc::channel(8);
    let mut projection = Projection::new(sql);
    projection.set_input(rx);
    let mut out = projection.take_output().unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(projection));

    tx.send(Message::Simple(ContextSimple::new())).await.unwrap();
    tx.send(row_message(2, &[("a", Value::Int(9))])).await.unwrap();
    drop(tx);

    let run = tokio::spawn(pipeline.run());
    let results = collect(&mut out).await;
    run.await.unwrap().unwrap();

    // the unknown body was dropped, the following row still flowed
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get("a"), Some(Value::Int(9)));
}

#[tokio::test]
async fn test_projection_cancellation_closes_output() {
    let sql = SqlSelect::new(vec![Column::new("a", 0, 0)]);

    // keep the input open so only cancellation can end the task
    let (_tx, rx) = mpsc::channel::<Message>(8);
    let mut projection = Projection::new(sql);
    projection.set_input(rx);
    let mut out = projection.take_output().unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add(Box::new(projection));
    let sig = pipeline.sig();

    let run = tokio::spawn(pipeline.run());
    sig.close();

    tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("pipeline must stop promptly after the signal")
        .unwrap()
        .unwrap();
    assert!(out.recv().await.is_none());
}
