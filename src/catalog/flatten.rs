use crate::model::{BookmarkNode, Item, ItemId, ItemKind};

/// Flattens the bookmark tree in pre-order: a folder precedes its own children,
/// which precede the folder's next sibling. The root itself is never emitted.
pub fn flatten_tree(root: &BookmarkNode, separator: &str) -> Vec<Item> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    visit(root, &mut path, separator, &mut out);
    out
}

fn visit<'a>(
    node: &'a BookmarkNode,
    path: &mut Vec<&'a str>,
    separator: &str,
    out: &mut Vec<Item>,
) {
    if let Some(url) = &node.url {
        out.push(to_item(node, ItemKind::Bookmark, Some(url.clone()), path, separator));
        return;
    }
    if node.children.is_none() && !node.is_root() {
        return;
    }

    let named = !node.is_root() && !node.title.is_empty();
    if named {
        out.push(to_item(node, ItemKind::Folder, None, path, separator));
        path.push(&node.title);
    }
    for child in node.children.iter().flatten() {
        visit(child, path, separator, out);
    }
    if named {
        path.pop();
    }
}

fn to_item(
    node: &BookmarkNode,
    kind: ItemKind,
    url: Option<String>,
    path: &[&str],
    separator: &str,
) -> Item {
    Item {
        id: ItemId::Bookmark(node.id.clone()),
        parent_id: node.parent_id.clone(),
        url,
        title: node.title.clone(),
        kind,
        path: path.join(separator),
        date_added: node.date_added,
        visit_count: 0,
        last_visit_time: None,
        visits: Vec::new(),
        use_count: 0,
        last_used: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn folder(id: &str, parent: &str, title: &str, children: Vec<BookmarkNode>) -> BookmarkNode {
        BookmarkNode {
            id: id.into(),
            parent_id: Some(parent.into()),
            title: title.into(),
            url: None,
            date_added: Some(1),
            children: Some(children),
        }
    }

    pub(crate) fn bookmark(id: &str, parent: &str, title: &str, url: &str) -> BookmarkNode {
        BookmarkNode {
            id: id.into(),
            parent_id: Some(parent.into()),
            title: title.into(),
            url: Some(url.into()),
            date_added: Some(2),
            children: None,
        }
    }

    pub(crate) fn sample_tree() -> BookmarkNode {
        BookmarkNode {
            id: "0".into(),
            parent_id: None,
            title: String::new(),
            url: None,
            date_added: None,
            children: Some(vec![
                folder(
                    "1",
                    "0",
                    "Bookmarks Bar",
                    vec![
                        folder(
                            "3",
                            "1",
                            "Rust",
                            vec![bookmark("5", "3", "Docs", "https://docs.rs/")],
                        ),
                        bookmark("4", "1", "News", "https://news.example.com/"),
                    ],
                ),
                folder("2", "0", "Other", vec![]),
            ]),
        }
    }

    #[test]
    fn emits_preorder_without_root() {
        let items = flatten_tree(&sample_tree(), " > ");
        let ids: Vec<_> = items.iter().map(|item| item.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "3", "5", "4", "2"]);
        assert!(items.iter().all(|item| item.id != ItemId::Bookmark("0".into())));
    }

    #[test]
    fn paths_exclude_root_and_self() {
        let items = flatten_tree(&sample_tree(), " > ");
        let by_id = |id: &str| {
            items
                .iter()
                .find(|item| item.id == ItemId::Bookmark(id.into()))
                .expect("item present")
        };
        assert_eq!(by_id("1").path, "");
        assert_eq!(by_id("3").path, "Bookmarks Bar");
        assert_eq!(by_id("5").path, "Bookmarks Bar > Rust");
        assert_eq!(by_id("5").kind, ItemKind::Bookmark);
        assert_eq!(by_id("3").kind, ItemKind::Folder);
    }

    #[test]
    fn untitled_folders_are_skipped_but_traversed() {
        let tree = folder(
            "0",
            "",
            "",
            vec![folder(
                "7",
                "0",
                "",
                vec![bookmark("8", "7", "Inner", "https://inner.example/")],
            )],
        );
        let items = flatten_tree(&tree, "/");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Inner");
        assert_eq!(items[0].path, "");
    }

    #[test]
    fn childless_non_url_nodes_are_ignored() {
        let mut tree = sample_tree();
        if let Some(children) = tree.children.as_mut() {
            children.push(BookmarkNode {
                id: "9".into(),
                parent_id: Some("0".into()),
                title: "Separator".into(),
                url: None,
                date_added: None,
                children: None,
            });
        }
        let items = flatten_tree(&tree, " > ");
        assert!(items.iter().all(|item| item.title != "Separator"));
    }
}
