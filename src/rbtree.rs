//! Intrusive red-black tree.
//!
//! A classic CLRS-style red-black tree over nodes embedded in the owning
//! type, keyed by a caller-supplied total ordering. Used by the scheduler's
//! runqueue (`sched::queue`) to keep ready threads ordered by virtual
//! runtime with O(log n) insert/remove and O(1) cached-minimum access.
//!
//! Debug builds verify the five red-black invariants after every mutation
//! (see `debug_check_invariants`), at the cost of an O(n) walk — acceptable
//! for a kernel runqueue that holds at most a few dozen threads.

use core::cmp::Ordering;
use core::marker::PhantomData;
use core::ptr::NonNull;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

/// An embeddable red-black tree node.
pub struct RbLink {
    parent: Option<NonNull<RbLink>>,
    left: Option<NonNull<RbLink>>,
    right: Option<NonNull<RbLink>>,
    color: Color,
    /// Tracks membership directly rather than overloading `parent`: the
    /// root's `parent` is legitimately `None` while still linked, so `None`
    /// can't double as the unlinked sentinel.
    linked: bool,
}

impl RbLink {
    pub const fn new() -> Self {
        Self {
            parent: None,
            left: None,
            right: None,
            color: Color::Red,
            linked: false,
        }
    }

    /// True while the node is a member of some tree, including when it is
    /// currently the root (whose `parent` is `None`).
    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

impl Default for RbLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Total ordering over two enclosing objects, used to place nodes in the
/// tree. Comparators should implement a stable tiebreak (e.g. insertion
/// sequence) so equal keys do not compare `Equal` spuriously, which would
/// break `find`.
pub trait RbComparator<T> {
    fn compare(a: &T, b: &T) -> Ordering;
}

/// An intrusive red-black tree over `T`, storing nodes at `link_offset`
/// bytes into each `T`.
///
/// # Safety
///
/// Every `NonNull<T>` inserted must stay valid and at a fixed address for
/// as long as it is linked.
pub struct RbTree<T, C: RbComparator<T>> {
    root: Option<NonNull<RbLink>>,
    min: Option<NonNull<RbLink>>,
    link_offset: usize,
    len: usize,
    _marker: PhantomData<(T, C)>,
}

impl<T, C: RbComparator<T>> RbTree<T, C> {
    pub const fn new(link_offset: usize) -> Self {
        Self {
            root: None,
            min: None,
            link_offset,
            len: 0,
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    unsafe fn link_of(&self, item: NonNull<T>) -> NonNull<RbLink> {
        unsafe {
            NonNull::new_unchecked(
                (item.as_ptr() as *mut u8).add(self.link_offset) as *mut RbLink
            )
        }
    }

    unsafe fn item_of(&self, link: NonNull<RbLink>) -> NonNull<T> {
        unsafe {
            NonNull::new_unchecked((link.as_ptr() as *mut u8).sub(self.link_offset) as *mut T)
        }
    }

    unsafe fn item_ref<'a>(&self, link: NonNull<RbLink>) -> &'a T {
        unsafe { &*self.item_of(link).as_ptr() }
    }

    /// O(1): the currently-smallest item, if any.
    pub fn peek_min(&self) -> Option<NonNull<T>> {
        self.min.map(|l| unsafe { self.item_of(l) })
    }

    fn color_of(n: Option<NonNull<RbLink>>) -> Color {
        match n {
            None => Color::Black,
            Some(p) => unsafe { p.as_ref().color },
        }
    }

    unsafe fn set_color(n: Option<NonNull<RbLink>>, c: Color) {
        if let Some(mut p) = n {
            unsafe {
                p.as_mut().color = c;
            }
        }
    }

    unsafe fn parent_of(n: NonNull<RbLink>) -> Option<NonNull<RbLink>> {
        unsafe { n.as_ref().parent }
    }

    /// Left rotation around `x`.
    unsafe fn rotate_left(&mut self, mut x: NonNull<RbLink>) {
        unsafe {
            let mut y = x.as_ref().right.expect("rotate_left needs right child");
            x.as_mut().right = y.as_ref().left;
            if let Some(mut yl) = y.as_ref().left {
                yl.as_mut().parent = Some(x);
            }
            y.as_mut().parent = x.as_ref().parent;
            match x.as_ref().parent {
                None => self.root = Some(y),
                Some(mut p) => {
                    if p.as_ref().left == Some(x) {
                        p.as_mut().left = Some(y);
                    } else {
                        p.as_mut().right = Some(y);
                    }
                }
            }
            y.as_mut().left = Some(x);
            x.as_mut().parent = Some(y);
        }
    }

    /// Right rotation around `x`.
    unsafe fn rotate_right(&mut self, mut x: NonNull<RbLink>) {
        unsafe {
            let mut y = x.as_ref().left.expect("rotate_right needs left child");
            x.as_mut().left = y.as_ref().right;
            if let Some(mut yr) = y.as_ref().right {
                yr.as_mut().parent = Some(x);
            }
            y.as_mut().parent = x.as_ref().parent;
            match x.as_ref().parent {
                None => self.root = Some(y),
                Some(mut p) => {
                    if p.as_ref().left == Some(x) {
                        p.as_mut().left = Some(y);
                    } else {
                        p.as_mut().right = Some(y);
                    }
                }
            }
            y.as_mut().right = Some(x);
            x.as_mut().parent = Some(y);
        }
    }

    /// Inserts `item`, placing it by `C::compare`. O(log n).
    pub fn insert(&mut self, item: NonNull<T>) {
        unsafe {
            let mut z = self.link_of(item);
            z.as_mut().left = None;
            z.as_mut().right = None;
            z.as_mut().color = Color::Red;
            z.as_mut().linked = true;

            let mut parent: Option<NonNull<RbLink>> = None;
            let mut cur = self.root;
            let mut went_left = false;
            while let Some(c) = cur {
                parent = Some(c);
                let ord = C::compare(self.item_ref(z), self.item_ref(c));
                went_left = ord != Ordering::Greater;
                cur = if went_left { c.as_ref().left } else { c.as_ref().right };
            }
            z.as_mut().parent = parent;
            match parent {
                None => self.root = Some(z),
                Some(mut p) => {
                    if went_left {
                        p.as_mut().left = Some(z);
                    } else {
                        p.as_mut().right = Some(z);
                    }
                }
            }

            if self.min.is_none() || C::compare(self.item_ref(z), self.item_ref(self.min.unwrap())) == Ordering::Less
            {
                self.min = Some(z);
            }
            self.len += 1;

            self.insert_fixup(z);
            debug_assert!(self.debug_check_invariants());
        }
    }

    unsafe fn insert_fixup(&mut self, mut z: NonNull<RbLink>) {
        unsafe {
            while Self::color_of(Self::parent_of(z)) == Color::Red {
                let mut p = Self::parent_of(z).unwrap();
                let gp = Self::parent_of(p).expect("red node must have a grandparent");
                if Some(p) == gp.as_ref().left {
                    let uncle = gp.as_ref().right;
                    if Self::color_of(uncle) == Color::Red {
                        Self::set_color(Some(p), Color::Black);
                        Self::set_color(uncle, Color::Black);
                        Self::set_color(Some(gp), Color::Red);
                        z = gp;
                    } else {
                        if p.as_ref().right == Some(z) {
                            z = p;
                            self.rotate_left(z);
                            p = Self::parent_of(z).unwrap();
                        }
                        Self::set_color(Some(p), Color::Black);
                        Self::set_color(Some(gp), Color::Red);
                        self.rotate_right(gp);
                    }
                } else {
                    let uncle = gp.as_ref().left;
                    if Self::color_of(uncle) == Color::Red {
                        Self::set_color(Some(p), Color::Black);
                        Self::set_color(uncle, Color::Black);
                        Self::set_color(Some(gp), Color::Red);
                        z = gp;
                    } else {
                        if p.as_ref().left == Some(z) {
                            z = p;
                            self.rotate_right(z);
                            p = Self::parent_of(z).unwrap();
                        }
                        Self::set_color(Some(p), Color::Black);
                        Self::set_color(Some(gp), Color::Red);
                        self.rotate_left(gp);
                    }
                }
                if Some(z) == self.root {
                    break;
                }
            }
            Self::set_color(self.root, Color::Black);
        }
    }

    /// Leftmost descendant of the subtree rooted at `n`.
    unsafe fn subtree_min(mut n: NonNull<RbLink>) -> NonNull<RbLink> {
        unsafe {
            while let Some(l) = n.as_ref().left {
                n = l;
            }
            n
        }
    }

    unsafe fn subtree_max(mut n: NonNull<RbLink>) -> NonNull<RbLink> {
        unsafe {
            while let Some(r) = n.as_ref().right {
                n = r;
            }
            n
        }
    }

    /// In-order successor of `item`, amortised O(log n).
    pub fn successor(&self, item: NonNull<T>) -> Option<NonNull<T>> {
        unsafe {
            let mut n = self.link_of(item);
            if let Some(r) = n.as_ref().right {
                return Some(self.item_of(Self::subtree_min(r)));
            }
            let mut p = n.as_ref().parent;
            while let Some(pp) = p {
                if pp.as_ref().right == Some(n) {
                    n = pp;
                    p = pp.as_ref().parent;
                } else {
                    return Some(self.item_of(pp));
                }
            }
            None
        }
    }

    /// Removes `item` from the tree. O(log n). Unlinks it regardless of
    /// whether it was actually a member (debug builds assert membership).
    pub fn remove(&mut self, item: NonNull<T>) {
        unsafe {
            let z = self.link_of(item);
            debug_assert!(z.as_ref().is_linked(), "remove of unlinked rb node");

            if self.min == Some(z) {
                self.min = self.successor(item).map(|p| self.link_of(p));
            }

            self.remove_link(z);
            self.len -= 1;
            debug_assert!(self.debug_check_invariants());
        }
    }

    /// Removes and returns the minimum item. O(log n).
    pub fn extract_min(&mut self) -> Option<NonNull<T>> {
        let min_link = self.min?;
        let item = unsafe { self.item_of(min_link) };
        self.remove(item);
        Some(item)
    }

    pub fn find(&self, needle: &T) -> Option<NonNull<T>> {
        unsafe {
            let mut cur = self.root;
            while let Some(c) = cur {
                match C::compare(needle, self.item_ref(c)) {
                    Ordering::Equal => return Some(self.item_of(c)),
                    Ordering::Less => cur = c.as_ref().left,
                    Ordering::Greater => cur = c.as_ref().right,
                }
            }
            None
        }
    }

    unsafe fn transplant(&mut self, u: NonNull<RbLink>, v: Option<NonNull<RbLink>>) {
        unsafe {
            match u.as_ref().parent {
                None => self.root = v,
                Some(mut p) => {
                    if p.as_ref().left == Some(u) {
                        p.as_mut().left = v;
                    } else {
                        p.as_mut().right = v;
                    }
                }
            }
            if let Some(mut v) = v {
                v.as_mut().parent = u.as_ref().parent;
            }
        }
    }

    unsafe fn remove_link(&mut self, z: NonNull<RbLink>) {
        unsafe {
            let mut y = z;
            let mut y_original_color = y.as_ref().color;
            let x: Option<NonNull<RbLink>>;
            // `x_parent` tracks the fixup anchor when `x` is None (a leaf
            // was spliced out), since there is no node to read `.parent`
            // from in that case.
            let x_parent: Option<NonNull<RbLink>>;

            if z.as_ref().left.is_none() {
                x = z.as_ref().right;
                x_parent = z.as_ref().parent;
                self.transplant(z, z.as_ref().right);
            } else if z.as_ref().right.is_none() {
                x = z.as_ref().left;
                x_parent = z.as_ref().parent;
                self.transplant(z, z.as_ref().left);
            } else {
                y = Self::subtree_min(z.as_ref().right.unwrap());
                y_original_color = y.as_ref().color;
                x = y.as_ref().right;
                if y.as_ref().parent == Some(z) {
                    x_parent = Some(y);
                } else {
                    x_parent = y.as_ref().parent;
                    self.transplant(y, y.as_ref().right);
                    let mut y_mut = y;
                    y_mut.as_mut().right = z.as_ref().right;
                    if let Some(mut r) = y_mut.as_ref().right {
                        r.as_mut().parent = Some(y);
                    }
                }
                self.transplant(z, Some(y));
                let mut y_mut = y;
                y_mut.as_mut().left = z.as_ref().left;
                if let Some(mut l) = y_mut.as_ref().left {
                    l.as_mut().parent = Some(y);
                }
                y_mut.as_mut().color = z.as_ref().color;
            }

            if y_original_color == Color::Black {
                self.remove_fixup(x, x_parent);
            }

            let mut z = z;
            z.as_mut().parent = None;
            z.as_mut().left = None;
            z.as_mut().right = None;
            z.as_mut().linked = false;
        }
    }

    unsafe fn remove_fixup(
        &mut self,
        mut x: Option<NonNull<RbLink>>,
        mut x_parent: Option<NonNull<RbLink>>,
    ) {
        unsafe {
            while x != self.root && Self::color_of(x) == Color::Black {
                let Some(mut parent) = x_parent else { break };
                if parent.as_ref().left == x {
                    let mut w = parent.as_ref().right;
                    if Self::color_of(w) == Color::Red {
                        Self::set_color(w, Color::Black);
                        Self::set_color(Some(parent), Color::Red);
                        self.rotate_left(parent);
                        w = parent.as_ref().right;
                    }
                    let w_node = w.expect("sibling of black node cannot be null");
                    if Self::color_of(w_node.as_ref().left) == Color::Black
                        && Self::color_of(w_node.as_ref().right) == Color::Black
                    {
                        Self::set_color(w, Color::Red);
                        x = Some(parent);
                        x_parent = parent.as_ref().parent;
                    } else {
                        if Self::color_of(w_node.as_ref().right) == Color::Black {
                            Self::set_color(w_node.as_ref().left, Color::Black);
                            Self::set_color(w, Color::Red);
                            self.rotate_right(w_node);
                            w = parent.as_ref().right;
                        }
                        let w_node = w.unwrap();
                        Self::set_color(w, parent.as_ref().color);
                        Self::set_color(Some(parent), Color::Black);
                        Self::set_color(w_node.as_ref().right, Color::Black);
                        self.rotate_left(parent);
                        x = self.root;
                        x_parent = None;
                    }
                } else {
                    let mut w = parent.as_ref().left;
                    if Self::color_of(w) == Color::Red {
                        Self::set_color(w, Color::Black);
                        Self::set_color(Some(parent), Color::Red);
                        self.rotate_right(parent);
                        w = parent.as_ref().left;
                    }
                    let w_node = w.expect("sibling of black node cannot be null");
                    if Self::color_of(w_node.as_ref().right) == Color::Black
                        && Self::color_of(w_node.as_ref().left) == Color::Black
                    {
                        Self::set_color(w, Color::Red);
                        x = Some(parent);
                        x_parent = parent.as_ref().parent;
                    } else {
                        if Self::color_of(w_node.as_ref().left) == Color::Black {
                            Self::set_color(w_node.as_ref().right, Color::Black);
                            Self::set_color(w, Color::Red);
                            self.rotate_left(w_node);
                            w = parent.as_ref().left;
                        }
                        let w_node = w.unwrap();
                        Self::set_color(w, parent.as_ref().color);
                        Self::set_color(Some(parent), Color::Black);
                        Self::set_color(w_node.as_ref().left, Color::Black);
                        self.rotate_right(parent);
                        x = self.root;
                        x_parent = None;
                    }
                }
            }
            Self::set_color(x, Color::Black);
        }
    }

    /// Debug-only validation of the five red-black invariants plus the
    /// cached-minimum and BST-ordering properties. O(n).
    #[cfg(debug_assertions)]
    fn debug_check_invariants(&self) -> bool {
        unsafe {
            if Self::color_of(self.root) != Color::Black {
                return false;
            }
            if let Some(r) = self.root {
                if r.as_ref().parent.is_some() {
                    return false;
                }
            }

            fn check<T, C: RbComparator<T>>(
                tree: &RbTree<T, C>,
                n: Option<NonNull<RbLink>>,
                lo: Option<&T>,
                hi: Option<&T>,
            ) -> Option<usize> {
                let Some(n) = n else { return Some(1) };
                unsafe {
                    let item = tree.item_ref(n);
                    if let Some(lo) = lo {
                        if C::compare(item, lo) == Ordering::Less {
                            return None;
                        }
                    }
                    if let Some(hi) = hi {
                        if C::compare(item, hi) == Ordering::Greater {
                            return None;
                        }
                    }
                    if RbTree::<T, C>::color_of(Some(n)) == Color::Red {
                        if RbTree::<T, C>::color_of(n.as_ref().left) == Color::Red
                            || RbTree::<T, C>::color_of(n.as_ref().right) == Color::Red
                        {
                            return None;
                        }
                    }
                    if let Some(l) = n.as_ref().left {
                        if l.as_ref().parent != Some(n) {
                            return None;
                        }
                    }
                    if let Some(r) = n.as_ref().right {
                        if r.as_ref().parent != Some(n) {
                            return None;
                        }
                    }
                    let lh = check(tree, n.as_ref().left, lo, Some(item))?;
                    let rh = check(tree, n.as_ref().right, Some(item), hi)?;
                    if lh != rh {
                        return None;
                    }
                    let add = if RbTree::<T, C>::color_of(Some(n)) == Color::Black { 1 } else { 0 };
                    Some(lh + add)
                }
            }

            if check::<T, C>(self, self.root, None, None).is_none() {
                return false;
            }

            match (self.root, self.min) {
                (None, None) => {}
                (Some(r), Some(m)) => {
                    if Self::subtree_min(r) != m {
                        return false;
                    }
                }
                _ => return false,
            }
            true
        }
    }

    #[cfg(not(debug_assertions))]
    fn debug_check_invariants(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    struct Node {
        link: RbLink,
        key: u64,
        seq: u64,
    }

    struct ByKey;
    impl RbComparator<Node> for ByKey {
        fn compare(a: &Node, b: &Node) -> Ordering {
            a.key.cmp(&b.key).then(a.seq.cmp(&b.seq))
        }
    }

    fn offset() -> usize {
        core::mem::offset_of!(Node, link)
    }

    #[test]
    fn sorted_extraction() {
        let keys = [5u64, 1, 9, 3, 7, 2, 8, 0, 6, 4];
        let mut boxes: alloc::vec::Vec<Box<Node>> = keys
            .iter()
            .enumerate()
            .map(|(i, &k)| {
                Box::new(Node {
                    link: RbLink::new(),
                    key: k,
                    seq: i as u64,
                })
            })
            .collect();

        let mut tree: RbTree<Node, ByKey> = RbTree::new(offset());
        for b in boxes.iter_mut() {
            tree.insert(NonNull::from(b.as_mut()));
        }
        assert_eq!(tree.len(), keys.len());

        let mut out = alloc::vec::Vec::new();
        while let Some(p) = tree.extract_min() {
            out.push(unsafe { p.as_ref().key });
        }
        assert_eq!(out, alloc::vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert!(tree.is_empty());
    }

    #[test]
    fn remove_marks_unlinked() {
        let mut a = Box::new(Node { link: RbLink::new(), key: 1, seq: 0 });
        let mut b = Box::new(Node { link: RbLink::new(), key: 2, seq: 1 });
        let mut tree: RbTree<Node, ByKey> = RbTree::new(offset());
        tree.insert(NonNull::from(a.as_mut()));
        tree.insert(NonNull::from(b.as_mut()));

        tree.remove(NonNull::from(a.as_mut()));
        assert!(!a.link.is_linked());
        assert_eq!(tree.len(), 1);
        assert_eq!(unsafe { tree.peek_min().unwrap().as_ref().key }, 2);
    }

    #[test]
    fn single_node_root_reports_linked_and_extracts_cleanly() {
        let mut a = Box::new(Node { link: RbLink::new(), key: 1, seq: 0 });
        let mut tree: RbTree<Node, ByKey> = RbTree::new(offset());
        tree.insert(NonNull::from(a.as_mut()));

        assert!(a.link.is_linked());
        let extracted = tree.extract_min().unwrap();
        assert_eq!(unsafe { extracted.as_ref().key }, 1);
        assert!(tree.is_empty());
    }
}
