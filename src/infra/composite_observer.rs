use crate::error::Result;
use crate::infra::{EpochReport, TrainingObserver};

pub struct CompositeObserver {
    observers: Vec<Box<dyn TrainingObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Box<dyn TrainingObserver>>) -> Self {
        Self { observers }
    }
}

impl TrainingObserver for CompositeObserver {
    fn on_train_start(&mut self, policy_name: &str, epochs: usize) -> Result<()> {
        for observer in &mut self.observers {
            observer.on_train_start(policy_name, epochs)?;
        }
        Ok(())
    }

    fn on_epoch(&mut self, report: &EpochReport) -> Result<()> {
        for observer in &mut self.observers {
            observer.on_epoch(report)?;
        }
        Ok(())
    }

    fn on_train_end(&mut self, best: Option<(usize, f32)>) -> Result<()> {
        for observer in &mut self.observers {
            observer.on_train_end(best)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl TrainingObserver for Recorder {
        fn on_train_start(&mut self, policy_name: &str, epochs: usize) -> Result<()> {
            self.events
                .borrow_mut()
                .push(format!("start {policy_name} {epochs}"));
            Ok(())
        }

        fn on_epoch(&mut self, report: &EpochReport) -> Result<()> {
            self.events.borrow_mut().push(format!("epoch {}", report.epoch));
            Ok(())
        }

        fn on_train_end(&mut self, best: Option<(usize, f32)>) -> Result<()> {
            self.events.borrow_mut().push(format!("end {best:?}"));
            Ok(())
        }
    }

    #[test]
    fn test_forwards_to_every_observer_in_order() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let observers: Vec<Box<dyn TrainingObserver>> = vec![
            Box::new(Recorder {
                events: Rc::clone(&events),
            }),
            Box::new(Recorder {
                events: Rc::clone(&events),
            }),
        ];
        let mut composite = CompositeObserver::new(observers);

        composite.on_train_start("drp", 2).unwrap();
        composite
            .on_epoch(&EpochReport {
                epoch: 0,
                loss: 1.0,
                avg_total_reward: -1.0,
                improved: true,
            })
            .unwrap();
        composite.on_train_end(Some((0, -1.0))).unwrap();

        assert_eq!(
            *events.borrow(),
            vec![
                "start drp 2",
                "start drp 2",
                "epoch 0",
                "epoch 0",
                "end Some((0, -1.0))",
                "end Some((0, -1.0))",
            ]
        );
    }
}
