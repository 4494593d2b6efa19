/*
 * Intrusive Doubly-Linked List
 *
 * This module implements the sentinel-headed intrusive list that every
 * scheduler queue in the kernel is built on. "Intrusive" means the link
 * node (ListElem) is embedded inside the structure being tracked, so
 * insertion and removal never allocate and are O(1) given the element.
 *
 * A list owns two sentinel elements, head and tail, with the real
 * elements strung between them:
 *
 *      +------+     +-------+     +-------+     +------+
 *      | head |<--->|   1   |<--->|   2   |<--->| tail |
 *      +------+     +-------+     +-------+     +------+
 *
 * The sentinels make every interior operation branch-free: an element
 * always has a live predecessor and successor, so insert/remove never
 * special-case the ends.
 *
 * Containers are recovered from element pointers with the list_entry!
 * macro, which subtracts the field offset of the embedded ListElem.
 *
 * Ordering operations (insert_ordered, sort, max, min, unique) take a
 * caller-supplied comparator: a plain function pointer receiving two
 * element pointers and an opaque auxiliary pointer. The comparator must
 * be a strict weak order. A list sorted under one comparator does NOT
 * stay sorted if the keys it compares mutate afterwards; callers that
 * mutate keys (the priority donation machinery does) must re-insert or
 * re-sort before trusting the order again.
 *
 * Thread safety: none at this layer. Every list in the scheduler is
 * mutated with interrupts disabled; that discipline is enforced by the
 * callers, not here.
 */

use core::ptr;

/// Link node embedded in any structure that wants list membership.
///
/// A ListElem belongs to at most one list at a time. The `elem` handle
/// of a thread, for example, is in exactly one of the ready queue, a
/// waiter list, the sleep list, or the destruction list, and the state
/// machine guarantees the mutual exclusion.
#[derive(Debug)]
#[repr(C)]
pub struct ListElem {
    prev: *mut ListElem,
    next: *mut ListElem,
}

impl ListElem {
    /// An unlinked element. Links are dangling until the element is
    /// inserted into a list.
    pub const fn new() -> Self {
        Self {
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }
}

impl Default for ListElem {
    fn default() -> Self {
        Self::new()
    }
}

/// Comparator for ordering operations.
///
/// Returns true when `a` must come strictly before `b`. `aux` is passed
/// through untouched for comparators that need context.
pub type ListLess = unsafe fn(a: *const ListElem, b: *const ListElem, aux: *const ()) -> bool;

/// Recovers a pointer to the structure containing an embedded ListElem.
///
/// `$elem` is a `*mut ListElem` that is known to live inside a
/// `$container` at field `$field`. Dereferencing the result is only
/// valid under that assumption.
#[macro_export]
macro_rules! list_entry {
    ($elem:expr, $container:ty, $field:ident) => {
        ($elem as *mut u8).wrapping_sub(core::mem::offset_of!($container, $field))
            as *mut $container
    };
}

/// True if `elem` is the head sentinel of some list.
fn is_head(elem: *const ListElem) -> bool {
    !elem.is_null() && unsafe { (*elem).prev.is_null() && !(*elem).next.is_null() }
}

/// True if `elem` is a real element (not a sentinel).
fn is_interior(elem: *const ListElem) -> bool {
    !elem.is_null() && unsafe { !(*elem).prev.is_null() && !(*elem).next.is_null() }
}

/// True if `elem` is the tail sentinel of some list.
fn is_tail(elem: *const ListElem) -> bool {
    !elem.is_null() && unsafe { !(*elem).prev.is_null() && (*elem).next.is_null() }
}

/// Element following `elem`. Walking off the end stops at the tail
/// sentinel, which compares equal to `List::end`.
///
/// # Safety
/// `elem` must be the head sentinel or an interior element of a live list.
pub unsafe fn next(elem: *mut ListElem) -> *mut ListElem {
    debug_assert!(is_head(elem) || is_interior(elem));
    unsafe { (*elem).next }
}

/// Element preceding `elem`.
///
/// # Safety
/// `elem` must be an interior element or the tail sentinel of a live list.
pub unsafe fn prev(elem: *mut ListElem) -> *mut ListElem {
    debug_assert!(is_interior(elem) || is_tail(elem));
    unsafe { (*elem).prev }
}

/// Inserts `elem` just before `before`, which may be an interior
/// element or the tail sentinel.
///
/// # Safety
/// `before` must be linked into a live list; `elem` must not currently
/// be a member of any list.
pub unsafe fn insert(before: *mut ListElem, elem: *mut ListElem) {
    debug_assert!(is_interior(before) || is_tail(before));
    debug_assert!(!elem.is_null());

    unsafe {
        (*elem).prev = (*before).prev;
        (*elem).next = before;
        (*(*before).prev).next = elem;
        (*before).prev = elem;
    }
}

/// Removes `elem` from its list and returns the element that followed
/// it. The removed element's links are left dangling; re-insert before
/// trusting them again.
///
/// # Safety
/// `elem` must be an interior element of a live list.
pub unsafe fn remove(elem: *mut ListElem) -> *mut ListElem {
    debug_assert!(is_interior(elem));
    unsafe {
        (*(*elem).prev).next = (*elem).next;
        (*(*elem).next).prev = (*elem).prev;
        (*elem).next
    }
}

/// Removes the run [first, last) from its current list and inserts it
/// just before `before`, which may be in the same or another list.
///
/// # Safety
/// `before` must be an interior element or tail sentinel; `first` and
/// `last` must delimit a valid run not containing `before`.
pub unsafe fn splice(before: *mut ListElem, first: *mut ListElem, last: *mut ListElem) {
    debug_assert!(is_interior(before) || is_tail(before));
    if first == last {
        return;
    }
    unsafe {
        let last = prev(last);

        debug_assert!(is_interior(first));
        debug_assert!(is_interior(last));

        // Cleanly detach the run from its current list.
        (*(*first).prev).next = (*last).next;
        (*(*last).next).prev = (*first).prev;

        // Splice it in ahead of `before`.
        (*first).prev = (*before).prev;
        (*last).next = before;
        (*(*before).prev).next = first;
        (*before).prev = last;
    }
}

/// Sentinel-headed intrusive list.
///
/// A List must be initialized in place with [`List::init`] once it has
/// reached its final address, and must not be moved afterwards: the
/// sentinels hold pointers into the structure itself.
#[derive(Debug)]
#[repr(C)]
pub struct List {
    head: ListElem,
    tail: ListElem,
}

impl List {
    /// A list with dangling sentinels. Call [`List::init`] before use.
    pub const fn new() -> Self {
        Self {
            head: ListElem::new(),
            tail: ListElem::new(),
        }
    }

    /// Links the sentinels, producing an empty list. Must run after the
    /// list has reached its final address.
    pub fn init(&mut self) {
        let head = &raw mut self.head;
        let tail = &raw mut self.tail;
        unsafe {
            (*head).prev = ptr::null_mut();
            (*head).next = tail;
            (*tail).prev = head;
            (*tail).next = ptr::null_mut();
        }
    }

    /// The head sentinel. Useful as the terminator of reverse traversal.
    pub fn head(&mut self) -> *mut ListElem {
        &raw mut self.head
    }

    /// The tail sentinel.
    pub fn tail(&mut self) -> *mut ListElem {
        &raw mut self.tail
    }

    /// First real element, or `end()` if the list is empty.
    pub fn begin(&mut self) -> *mut ListElem {
        self.head.next
    }

    /// Past-the-end position (the tail sentinel).
    pub fn end(&mut self) -> *mut ListElem {
        &raw mut self.tail
    }

    /// Last real element, or `head()` if the list is empty.
    pub fn rbegin(&mut self) -> *mut ListElem {
        self.tail.prev
    }

    pub fn is_empty(&self) -> bool {
        ptr::eq(self.head.next, &self.tail)
    }

    /// Number of elements, by traversal.
    pub fn len(&mut self) -> usize {
        let mut count = 0;
        let mut e = self.begin();
        while e != self.end() {
            count += 1;
            e = unsafe { next(e) };
        }
        count
    }

    /// First element. The list must not be empty.
    pub fn front(&mut self) -> *mut ListElem {
        assert!(!self.is_empty());
        self.head.next
    }

    /// Last element. The list must not be empty.
    pub fn back(&mut self) -> *mut ListElem {
        assert!(!self.is_empty());
        self.tail.prev
    }

    /// # Safety
    /// `elem` must not currently be a member of any list.
    pub unsafe fn push_front(&mut self, elem: *mut ListElem) {
        unsafe { insert(self.begin(), elem) }
    }

    /// # Safety
    /// `elem` must not currently be a member of any list.
    pub unsafe fn push_back(&mut self, elem: *mut ListElem) {
        unsafe { insert(self.end(), elem) }
    }

    /// Removes and returns the first element. The list must not be empty.
    ///
    /// # Safety
    /// The list must be initialized and its membership pointers valid.
    pub unsafe fn pop_front(&mut self) -> *mut ListElem {
        let front = self.front();
        unsafe { remove(front) };
        front
    }

    /// Removes and returns the last element. The list must not be empty.
    ///
    /// # Safety
    /// The list must be initialized and its membership pointers valid.
    pub unsafe fn pop_back(&mut self) -> *mut ListElem {
        let back = self.back();
        unsafe { remove(back) };
        back
    }

    /// Inserts `elem` at its ordered position: just before the first
    /// existing element E for which `less(elem, E)` holds. Among equal
    /// keys this lands the new element *after* the old ones, so ordered
    /// insertion is FIFO among equals, the property the ready queue's
    /// tie-breaking relies on.
    ///
    /// # Safety
    /// The list must already be sorted under `less`; `elem` must not be
    /// a member of any list.
    pub unsafe fn insert_ordered(&mut self, elem: *mut ListElem, less: ListLess, aux: *const ()) {
        debug_assert!(!elem.is_null());
        unsafe {
            let mut e = self.begin();
            while e != self.end() {
                if less(elem, e, aux) {
                    break;
                }
                e = next(e);
            }
            insert(e, elem);
        }
    }

    /// Reverses the order of the elements.
    ///
    /// # Safety
    /// The list must be initialized and its membership pointers valid.
    pub unsafe fn reverse(&mut self) {
        if self.is_empty() {
            return;
        }
        unsafe {
            let mut e = self.begin();
            while e != self.end() {
                let p = (*e).prev;
                (*e).prev = (*e).next;
                (*e).next = p;
                e = (*e).prev;
            }
            core::mem::swap(&mut self.head.next, &mut self.tail.prev);
            let first = self.head.next;
            let last = self.tail.prev;
            (*first).prev = &raw mut self.head;
            (*last).next = &raw mut self.tail;
        }
    }

    /// Sorts the list under `less` with an in-place, stable, O(n lg n)
    /// natural merge sort: repeatedly find two adjacent nondecreasing
    /// runs and merge them, until a single run remains.
    ///
    /// # Safety
    /// The list must be initialized; the comparator must be a strict
    /// weak order over the elements.
    pub unsafe fn sort(&mut self, less: ListLess, aux: *const ()) {
        unsafe {
            loop {
                let mut output_runs = 0;
                let mut a0 = self.begin();
                while a0 != self.end() {
                    output_runs += 1;
                    let a1b0 = find_end_of_run(a0, self.end(), less, aux);
                    if a1b0 == self.end() {
                        break;
                    }
                    let b1 = find_end_of_run(a1b0, self.end(), less, aux);
                    inplace_merge(a0, a1b0, b1, less, aux);
                    a0 = b1;
                }
                if output_runs <= 1 {
                    break;
                }
            }
            debug_assert!(is_sorted(self.begin(), self.end(), less, aux));
        }
    }

    /// Removes adjacent elements that compare equal under `less`,
    /// appending the removed duplicates to `duplicates` when provided.
    ///
    /// # Safety
    /// The list must be initialized; typically it is sorted first so
    /// that all duplicates are adjacent.
    pub unsafe fn unique(&mut self, mut duplicates: Option<&mut List>, less: ListLess, aux: *const ()) {
        if self.is_empty() {
            return;
        }
        unsafe {
            let mut elem = self.begin();
            loop {
                let n = next(elem);
                if n == self.end() {
                    break;
                }
                if !less(elem, n, aux) && !less(n, elem, aux) {
                    remove(n);
                    if let Some(dups) = duplicates.as_deref_mut() {
                        dups.push_back(n);
                    }
                } else {
                    elem = n;
                }
            }
        }
    }

    /// Largest element under `less`, or `end()` if the list is empty.
    /// Ties go to the earliest such element.
    ///
    /// # Safety
    /// The list must be initialized and its membership pointers valid.
    pub unsafe fn max(&mut self, less: ListLess, aux: *const ()) -> *mut ListElem {
        unsafe {
            let mut max = self.begin();
            if max != self.end() {
                let mut e = next(max);
                while e != self.end() {
                    if less(max, e, aux) {
                        max = e;
                    }
                    e = next(e);
                }
            }
            max
        }
    }

    /// Smallest element under `less`, or `end()` if the list is empty.
    /// Ties go to the earliest such element.
    ///
    /// # Safety
    /// The list must be initialized and its membership pointers valid.
    pub unsafe fn min(&mut self, less: ListLess, aux: *const ()) -> *mut ListElem {
        unsafe {
            let mut min = self.begin();
            if min != self.end() {
                let mut e = next(min);
                while e != self.end() {
                    if less(e, min, aux) {
                        min = e;
                    }
                    e = next(e);
                }
            }
            min
        }
    }
}

/// True if [a, b) is nondecreasing under `less`.
unsafe fn is_sorted(a: *mut ListElem, b: *mut ListElem, less: ListLess, aux: *const ()) -> bool {
    unsafe {
        if a != b {
            let mut e = next(a);
            while e != b {
                if less(e, prev(e), aux) {
                    return false;
                }
                e = next(e);
            }
        }
        true
    }
}

/// Returns the end of the maximal nondecreasing run starting at `a`,
/// bounded by `b`. `a` must not equal `b`.
unsafe fn find_end_of_run(
    a: *mut ListElem,
    b: *mut ListElem,
    less: ListLess,
    aux: *const (),
) -> *mut ListElem {
    debug_assert!(!a.is_null() && !b.is_null());
    debug_assert!(a != b);
    unsafe {
        let mut a = a;
        loop {
            a = next(a);
            if a == b || less(a, prev(a), aux) {
                return a;
            }
        }
    }
}

/// Merges the sorted run [a0, a1b0) with the sorted run [a1b0, b1) to
/// form a single sorted run [a0, b1). The merge is stable: elements of
/// the first run stay ahead of equal elements of the second.
unsafe fn inplace_merge(
    a0: *mut ListElem,
    a1b0: *mut ListElem,
    b1: *mut ListElem,
    less: ListLess,
    aux: *const (),
) {
    unsafe {
        debug_assert!(is_sorted(a0, a1b0, less, aux));
        debug_assert!(is_sorted(a1b0, b1, less, aux));

        let mut a0 = a0;
        let mut a1b0 = a1b0;
        while a0 != a1b0 && a1b0 != b1 {
            if !less(a1b0, a0, aux) {
                a0 = next(a0);
            } else {
                a1b0 = next(a1b0);
                splice(a0, prev(a1b0), a1b0);
            }
        }
    }
}
