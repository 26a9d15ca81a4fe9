//! Fold flat layer records into the group tree, and flatten it back
//!
//! An item path `[i0, .., ik]` names the `ik`-th child of the group at
//! `[i0, .., ik-1]`. Records without a path are top-level and take the next
//! free top-level index. Groups precede their children in the pointer table,
//! so a single pass with a path-to-group map is enough.

use crate::error::{Result, XcfError};
use crate::layer::{LayerRecord, RecordContent};
use crate::model::layer::check_stack_alpha;
use crate::model::{GroupLayer, ImageLayer, LayerNode, LayerProps};
use std::collections::HashMap;

/// Arena entry; children are arena ids tagged with their sibling index
struct Pending {
    props: LayerProps,
    has_alpha: bool,
    content: RecordContent,
    children: Vec<(u32, usize)>,
}

/// Build the tree from records in pointer-table order
pub(crate) fn build_tree(records: Vec<LayerRecord>) -> Result<Vec<LayerNode>> {
    let mut arena: Vec<Pending> = Vec::with_capacity(records.len());
    let mut roots: Vec<(u32, usize)> = Vec::new();
    // item path -> (arena id, absolute x, absolute y), groups only
    let mut groups: HashMap<Vec<u32>, (usize, i32, i32)> = HashMap::new();

    for record in records {
        let LayerRecord {
            mut props,
            layout,
            item_path,
            content,
        } = record;
        let path = item_path.unwrap_or_else(|| vec![roots.len() as u32]);
        let Some((&index, parent_path)) = path.split_last() else {
            return Err(XcfError::InvalidGroup(format!(
                "layer {:?} has an empty item path",
                props.name
            )));
        };

        let (abs_x, abs_y) = (props.x, props.y);
        let id = arena.len();
        let siblings = if parent_path.is_empty() {
            &mut roots
        } else {
            let &(parent, parent_x, parent_y) = groups.get(parent_path).ok_or_else(|| {
                XcfError::InvalidGroup(format!(
                    "layer {:?} at {:?} has no parent group at {:?}",
                    props.name, path, parent_path
                ))
            })?;
            let (Some(x), Some(y)) = (abs_x.checked_sub(parent_x), abs_y.checked_sub(parent_y))
            else {
                return Err(XcfError::InvalidGroup(format!(
                    "layer {:?} at ({}, {}) cannot be placed relative to its group at ({}, {})",
                    props.name, abs_x, abs_y, parent_x, parent_y
                )));
            };
            props.x = x;
            props.y = y;
            &mut arena[parent].children
        };

        if siblings.iter().any(|&(taken, _)| taken == index) {
            return Err(XcfError::InvalidGroup(format!(
                "item path {:?} of layer {:?} is used twice",
                path, props.name
            )));
        }
        siblings.push((index, id));

        if matches!(content, RecordContent::Group { .. }) {
            groups.insert(path, (id, abs_x, abs_y));
        }
        arena.push(Pending {
            props,
            has_alpha: layout.has_alpha(),
            content,
            children: Vec::new(),
        });
    }

    check_siblings(&roots, &arena)?;
    for pending in &arena {
        check_siblings(&pending.children, &arena)?;
    }

    // Children always come after their parent, so assembling back to front
    // finds every child already built.
    let mut built: Vec<Option<LayerNode>> = Vec::with_capacity(arena.len());
    built.resize_with(arena.len(), || None);
    for (id, pending) in arena.into_iter().enumerate().rev() {
        let node = match pending.content {
            RecordContent::Image(image) => LayerNode::Image(ImageLayer {
                props: pending.props,
                image,
            }),
            RecordContent::Group { expanded } => LayerNode::Group(GroupLayer {
                props: pending.props,
                expanded,
                children: take_ordered(pending.children, &mut built)?,
            }),
        };
        built[id] = Some(node);
    }
    take_ordered(roots, &mut built)
}

/// Every layer above the bottom of a sibling stack needs alpha
fn check_siblings(siblings: &[(u32, usize)], arena: &[Pending]) -> Result<()> {
    let mut ordered = siblings.to_vec();
    ordered.sort_by_key(|&(index, _)| index);
    check_stack_alpha(
        ordered
            .iter()
            .map(|&(_, id)| (arena[id].props.name.as_str(), arena[id].has_alpha)),
    )
}

fn take_ordered(
    mut children: Vec<(u32, usize)>,
    built: &mut [Option<LayerNode>],
) -> Result<Vec<LayerNode>> {
    children.sort_by_key(|&(index, _)| index);
    children
        .into_iter()
        .map(|(_, id)| {
            built[id]
                .take()
                .ok_or_else(|| XcfError::InvalidGroup(format!("layer {} placed twice", id)))
        })
        .collect()
}

/// One layer in file order, with its canvas offset and item path
pub(crate) struct FlatLayer<'a> {
    pub node: &'a LayerNode,
    pub x: i32,
    pub y: i32,
    pub path: Vec<u32>,
}

impl FlatLayer<'_> {
    /// Top-level layers carry no ITEM_PATH property
    pub fn item_path(&self) -> Option<&[u32]> {
        (self.path.len() > 1).then_some(self.path.as_slice())
    }
}

/// Pre-order walk: each group is followed by its children, top of each stack first
pub(crate) fn flatten(layers: &[LayerNode]) -> Result<Vec<FlatLayer<'_>>> {
    let mut out = Vec::new();
    let mut stack: Vec<(&LayerNode, i32, i32, Vec<u32>)> = layers
        .iter()
        .enumerate()
        .rev()
        .map(|(i, node)| (node, 0, 0, vec![i as u32]))
        .collect();

    while let Some((node, parent_x, parent_y, path)) = stack.pop() {
        let (Some(x), Some(y)) = (
            parent_x.checked_add(node.props().x),
            parent_y.checked_add(node.props().y),
        ) else {
            return Err(XcfError::InvalidDocument(format!(
                "canvas offset of layer {:?} overflows",
                node.name()
            )));
        };
        for (i, child) in node.children().iter().enumerate().rev() {
            let mut child_path = path.clone();
            child_path.push(i as u32);
            stack.push((child, x, y, child_path));
        }
        out.push(FlatLayer { node, x, y, path });
    }
    Ok(out)
}

/// Enforce the alpha rule on every sibling stack of an in-memory tree
pub(crate) fn check_tree_alpha(layers: &[LayerNode]) -> Result<()> {
    check_stack_alpha(layers.iter().map(|l| (l.name(), l.has_alpha())))?;
    layers
        .iter()
        .try_for_each(|layer| check_tree_alpha(layer.children()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LayerImage, PixelLayout, Raster};

    fn image(name: &str, x: i32, y: i32, path: Option<Vec<u32>>) -> LayerRecord {
        let mut props = LayerProps::new(name, 1, 1);
        props.x = x;
        props.y = y;
        LayerRecord {
            props,
            layout: PixelLayout::Rgba,
            item_path: path,
            content: RecordContent::Image(LayerImage::from(Raster::new(1, 1, PixelLayout::Rgba))),
        }
    }

    fn group(name: &str, x: i32, y: i32, path: Option<Vec<u32>>) -> LayerRecord {
        LayerRecord {
            content: RecordContent::Group { expanded: true },
            ..image(name, x, y, path)
        }
    }

    fn names(nodes: &[LayerNode]) -> Vec<&str> {
        nodes.iter().map(LayerNode::name).collect()
    }

    #[test]
    fn test_flat_stack() {
        let tree = build_tree(vec![image("a", 0, 0, None), image("b", 0, 0, None)]).unwrap();
        assert_eq!(names(&tree), ["a", "b"]);
    }

    #[test]
    fn test_nested_offsets_are_relative() {
        let tree = build_tree(vec![
            group("outer", 10, 20, None),
            group("inner", 15, 25, Some(vec![0, 0])),
            image("leaf", 16, 30, Some(vec![0, 0, 0])),
            image("bottom", 0, 0, None),
        ])
        .unwrap();

        assert_eq!(names(&tree), ["outer", "bottom"]);
        let inner = &tree[0].children()[0];
        assert_eq!((inner.props().x, inner.props().y), (5, 5));
        let leaf = &inner.children()[0];
        assert_eq!((leaf.props().x, leaf.props().y), (1, 5));
    }

    #[test]
    fn test_children_sorted_by_index() {
        let tree = build_tree(vec![
            group("g", 0, 0, None),
            image("second", 0, 0, Some(vec![0, 1])),
            image("first", 0, 0, Some(vec![0, 0])),
        ])
        .unwrap();
        assert_eq!(names(tree[0].children()), ["first", "second"]);
    }

    #[test]
    fn test_unknown_parent() {
        let result = build_tree(vec![image("orphan", 0, 0, Some(vec![3, 0]))]);
        assert!(matches!(result, Err(XcfError::InvalidGroup(_))));

        // A leaf cannot be a parent
        let result = build_tree(vec![
            image("leaf", 0, 0, None),
            image("child", 0, 0, Some(vec![0, 0])),
        ]);
        assert!(matches!(result, Err(XcfError::InvalidGroup(_))));
    }

    #[test]
    fn test_empty_and_duplicate_paths() {
        assert!(matches!(
            build_tree(vec![image("x", 0, 0, Some(Vec::new()))]),
            Err(XcfError::InvalidGroup(_))
        ));
        assert!(matches!(
            build_tree(vec![
                group("g", 0, 0, None),
                image("a", 0, 0, Some(vec![0, 0])),
                image("b", 0, 0, Some(vec![0, 0])),
            ]),
            Err(XcfError::InvalidGroup(_))
        ));
    }

    #[test]
    fn test_missing_alpha_inside_group() {
        let mut opaque = image("opaque", 0, 0, Some(vec![0, 0]));
        opaque.layout = PixelLayout::Rgb;
        let result = build_tree(vec![
            group("g", 0, 0, None),
            opaque,
            image("under", 0, 0, Some(vec![0, 1])),
        ]);
        assert!(matches!(result, Err(XcfError::MissingAlpha(name)) if name == "opaque"));

        // The bottom of a stack may be opaque
        let mut background = image("background", 0, 0, None);
        background.layout = PixelLayout::Rgb;
        assert!(build_tree(vec![image("top", 0, 0, None), background]).is_ok());
    }

    #[test]
    fn test_single_element_paths_are_top_level_indices() {
        // `[0]` names top-level slot 0, which the first path-less layer already took
        let result = build_tree(vec![
            image("a", 0, 0, None),
            group("b", 0, 0, Some(vec![0])),
            group("c", 0, 0, Some(vec![1])),
            image("c0", 0, 0, Some(vec![0, 0])),
            image("c1", 0, 0, Some(vec![0, 1])),
        ]);
        assert!(matches!(result, Err(XcfError::InvalidGroup(_))));

        // The same shape with paths that follow the rule
        let tree = build_tree(vec![
            image("a", 0, 0, None),
            group("b", 0, 0, None),
            image("b0", 0, 0, Some(vec![1, 0])),
            image("b1", 0, 0, Some(vec![1, 1])),
        ])
        .unwrap();
        assert_eq!(names(&tree), ["a", "b"]);
        assert_eq!(names(tree[1].children()), ["b0", "b1"]);
    }

    #[test]
    fn test_offset_overflow_rejected() {
        let result = build_tree(vec![
            group("g", 1, 0, None),
            image("far", i32::MIN, 0, Some(vec![0, 0])),
        ]);
        assert!(matches!(result, Err(XcfError::InvalidGroup(_))));

        let far = image("far", i32::MAX, 0, Some(vec![0, 0]));
        let tree = vec![LayerNode::Group(GroupLayer {
            props: LayerProps::new("g", 1, 1).at(1, 0),
            expanded: true,
            children: vec![LayerNode::Image(ImageLayer {
                props: far.props,
                image: LayerImage::from(Raster::new(1, 1, PixelLayout::Rgba)),
            })],
        })];
        assert!(matches!(flatten(&tree), Err(XcfError::InvalidDocument(_))));
    }

    #[test]
    fn test_flatten_inverts_build() {
        let records = vec![
            image("top", 3, 3, None),
            group("g", 10, 10, None),
            image("g0", 12, 11, Some(vec![1, 0])),
            group("g1", 10, 10, Some(vec![1, 1])),
            image("g1-0", 20, 20, Some(vec![1, 1, 0])),
            image("bottom", 0, 0, None),
        ];
        let tree = build_tree(records.clone()).unwrap();
        let flat = flatten(&tree).unwrap();

        assert_eq!(flat.len(), records.len());
        for (layer, record) in flat.iter().zip(&records) {
            assert_eq!(layer.node.name(), record.props.name);
            assert_eq!((layer.x, layer.y), (record.props.x, record.props.y));
            assert_eq!(layer.item_path(), record.item_path.as_deref());
        }
    }
}
