//! Pagination traversal properties over the in-memory directory.

use kc_directory::{Cursor, CursorPaginator, Direction, MemberRow, MemoryDirectory};

fn row(id: i64, username: &str) -> MemberRow {
    MemberRow {
        id,
        username: username.to_string(),
        name: format!("Member {username}"),
        affiliation: None,
        avatar_url: None,
    }
}

/// n rows with distinct usernames u00, u01, ...
fn directory(n: usize) -> MemoryDirectory {
    MemoryDirectory::new(
        (0..n)
            .map(|i| row(i as i64 + 1, &format!("u{i:02}")))
            .collect(),
    )
}

#[tokio::test]
async fn first_page_of_empty_directory() {
    let paginator = CursorPaginator::new(directory(0)).with_page_size(4);
    let page = paginator.page(None, Direction::Next).await.unwrap();

    assert!(page.rows.is_empty());
    assert!(!page.has_next);
    assert!(!page.has_prev);
    assert_eq!(page.next_cursor, None);
    assert_eq!(page.prev_cursor, None);
    assert_eq!(page.current_page, 1);
    assert_eq!(page.page_count, 1);
    assert_eq!(page.total_count, 0);
}

#[tokio::test]
async fn following_next_visits_every_row_exactly_once_in_order() {
    let n = 10;
    let page_size = 4;
    let paginator = CursorPaginator::new(directory(n)).with_page_size(page_size);

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = paginator
            .page(cursor.as_deref(), Direction::Next)
            .await
            .unwrap();
        pages += 1;
        seen.extend(page.rows.iter().map(|r| r.username.clone()));
        if !page.has_next {
            break;
        }
        cursor = page.next_cursor;
    }

    // ceil(10 / 4) pages, every row once, ascending
    assert_eq!(pages, 3);
    let expected: Vec<String> = (0..n).map(|i| format!("u{i:02}")).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn prev_reproduces_the_preceding_page_exactly() {
    let paginator = CursorPaginator::new(directory(10)).with_page_size(4);

    let page1 = paginator.page(None, Direction::Next).await.unwrap();
    let page2 = paginator
        .page(page1.next_cursor.as_deref(), Direction::Next)
        .await
        .unwrap();
    assert!(page2.has_prev);

    let back = paginator
        .page(page2.prev_cursor.as_deref(), Direction::Prev)
        .await
        .unwrap();
    assert_eq!(back.rows, page1.rows);
    assert!(back.has_next);
}

#[tokio::test]
async fn prev_from_the_last_page_reproduces_the_middle_page() {
    let paginator = CursorPaginator::new(directory(10)).with_page_size(4);

    let page1 = paginator.page(None, Direction::Next).await.unwrap();
    let page2 = paginator
        .page(page1.next_cursor.as_deref(), Direction::Next)
        .await
        .unwrap();
    let page3 = paginator
        .page(page2.next_cursor.as_deref(), Direction::Next)
        .await
        .unwrap();
    assert!(!page3.has_next);

    let back = paginator
        .page(page3.prev_cursor.as_deref(), Direction::Prev)
        .await
        .unwrap();
    assert_eq!(back.rows, page2.rows);
}

#[tokio::test]
async fn current_page_estimate_tracks_position() {
    let paginator = CursorPaginator::new(directory(10)).with_page_size(4);

    let page1 = paginator.page(None, Direction::Next).await.unwrap();
    assert_eq!(page1.current_page, 1);
    assert_eq!(page1.page_count, 3);

    let page2 = paginator
        .page(page1.next_cursor.as_deref(), Direction::Next)
        .await
        .unwrap();
    assert_eq!(page2.current_page, 2);

    let page3 = paginator
        .page(page2.next_cursor.as_deref(), Direction::Next)
        .await
        .unwrap();
    assert_eq!(page3.current_page, 3);
    assert_eq!(page3.rows.len(), 2);
    assert!(!page3.has_next);
}

#[tokio::test]
async fn exact_multiple_has_no_phantom_page() {
    let paginator = CursorPaginator::new(directory(8)).with_page_size(4);

    let page1 = paginator.page(None, Direction::Next).await.unwrap();
    assert!(page1.has_next);
    let page2 = paginator
        .page(page1.next_cursor.as_deref(), Direction::Next)
        .await
        .unwrap();
    assert_eq!(page2.rows.len(), 4);
    assert!(!page2.has_next);
    assert_eq!(page2.page_count, 2);
}

#[tokio::test]
async fn ties_on_sort_key_are_broken_by_id() {
    let store = MemoryDirectory::new(vec![
        row(3, "same"),
        row(1, "same"),
        row(2, "same"),
    ]);
    let paginator = CursorPaginator::new(store).with_page_size(2);

    let page1 = paginator.page(None, Direction::Next).await.unwrap();
    let ids: Vec<i64> = page1.rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);

    let page2 = paginator
        .page(page1.next_cursor.as_deref(), Direction::Next)
        .await
        .unwrap();
    let ids: Vec<i64> = page2.rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![3]);
}

#[tokio::test]
async fn invalid_cursor_is_rejected() {
    let paginator = CursorPaginator::new(directory(4));
    assert!(paginator
        .page(Some("definitely-not-a-cursor"), Direction::Next)
        .await
        .is_err());
}

#[tokio::test]
async fn cursor_addresses_survive_inserts_before_the_boundary() {
    // keyset cursors are stable under churn earlier in the order
    let paginator = CursorPaginator::new(directory(6)).with_page_size(3);
    let page1 = paginator.page(None, Direction::Next).await.unwrap();
    let cursor = page1.next_cursor.clone().unwrap();

    // rebuild the store with an extra row that sorts before everything
    let mut rows: Vec<MemberRow> = (0..6).map(|i| row(i as i64 + 1, &format!("u{i:02}"))).collect();
    rows.push(row(99, "aaa_newcomer"));
    let paginator = CursorPaginator::new(MemoryDirectory::new(rows)).with_page_size(3);

    let page2 = paginator
        .page(Some(&cursor), Direction::Next)
        .await
        .unwrap();
    let usernames: Vec<&str> = page2.rows.iter().map(|r| r.username.as_str()).collect();
    // same boundary, same following rows, regardless of the insert
    assert_eq!(usernames, vec!["u03", "u04", "u05"]);
}

#[tokio::test]
async fn decoded_cursor_matches_the_boundary_row() {
    let paginator = CursorPaginator::new(directory(6)).with_page_size(3);
    let page = paginator.page(None, Direction::Next).await.unwrap();
    let token = page.next_cursor.unwrap();
    let cursor = Cursor::decode(&token).unwrap();
    let last = page.rows.last().unwrap();
    assert_eq!(cursor.sort_key, last.username);
    assert_eq!(cursor.id, last.id);
}
