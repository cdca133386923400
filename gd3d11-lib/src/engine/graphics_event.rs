use std::rc::Rc;

use super::device::UserAnnotation;

/// A named GPU profiling region, ended when the record is dropped.
#[derive(Default)]
pub struct GraphicsEventRecord {
    annotation: Option<Rc<dyn UserAnnotation>>,
}

impl GraphicsEventRecord {
    pub fn begin(annotation: Rc<dyn UserAnnotation>, label: &str) -> Self {
        annotation.begin_event(label);
        Self {
            annotation: Some(annotation),
        }
    }

    /// A record that emits nothing, used when events are disabled.
    pub fn inert() -> Self {
        Self::default()
    }

    pub fn is_inert(&self) -> bool {
        self.annotation.is_none()
    }
}

impl Drop for GraphicsEventRecord {
    fn drop(&mut self) {
        if let Some(annotation) = self.annotation.take() {
            annotation.end_event();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct Log(RefCell<Vec<String>>);

    impl UserAnnotation for Log {
        fn begin_event(&self, label: &str) {
            self.0.borrow_mut().push(format!("begin {}", label));
        }
        fn end_event(&self) {
            self.0.borrow_mut().push("end".to_owned());
        }
    }

    fn nested(log: &Rc<Log>, fail: bool) -> Result<(), &'static str> {
        let _outer = GraphicsEventRecord::begin(log.clone(), "outer");
        let _inner = GraphicsEventRecord::begin(log.clone(), "inner");
        if fail {
            return Err("failed");
        }
        Ok(())
    }

    #[test]
    fn events_nest_and_end_in_reverse_order() {
        let log = Rc::new(Log::default());
        nested(&log, true).unwrap_err();
        assert_eq!(
            *log.0.borrow(),
            ["begin outer", "begin inner", "end", "end"]
        );
    }

    #[test]
    fn moved_record_ends_once() {
        let log = Rc::new(Log::default());
        let record = GraphicsEventRecord::begin(log.clone(), "frame");
        let moved = vec![record];
        assert_eq!(log.0.borrow().len(), 1);
        drop(moved);
        assert_eq!(*log.0.borrow(), ["begin frame", "end"]);
    }

    #[test]
    fn inert_record_emits_nothing() {
        let record = GraphicsEventRecord::inert();
        assert!(record.is_inert());
        drop(record);
    }
}
