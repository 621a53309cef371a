//! Retransmission timeout estimation and the periodic sweeps.
//!
//! See [RFC6298] for the estimator and [RFC1122] section 4.2.3.2 for delayed acknowledgements.
//!
//! [RFC6298]: https://tools.ietf.org/html/rfc6298
//! [RFC1122]: https://tools.ietf.org/html/rfc1122
use core::cmp;

use crate::layer::{ip, Error};
use crate::time::{Duration, Instant};

use super::connection::State;
use super::endpoint::Endpoint;

/// The timeout before the first RTT sample.
pub const RTO_INITIAL: Duration = Duration::from_millis(1_000);

/// The lower bound of the timeout.
pub const RTO_MIN: Duration = Duration::from_millis(1_000);

/// The upper bound of the timeout, also for backoff.
pub const RTO_MAX: Duration = Duration::from_millis(60_000);

/// The clock granularity `G`, the period of the slow timer rounded down.
pub const CLOCK_GRANULARITY: Duration = Duration::from_millis(100);

/// Smoothed round trip time estimation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RtoEstimator {
    srtt: Option<Duration>,
    rttvar: Duration,
    rto: Duration,
}

impl RtoEstimator {
    /// An estimator without any samples.
    pub fn new() -> Self {
        RtoEstimator {
            srtt: None,
            rttvar: Duration::from_millis(0),
            rto: RTO_INITIAL,
        }
    }

    /// The current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// The smoothed round trip time, once sampled.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// The round trip time variation.
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    /// Update the estimation with a new round trip measurement.
    pub fn sample(&mut self, rtt: Duration) {
        let srtt = match self.srtt {
            None => {
                self.rttvar = rtt / 2;
                rtt
            },
            Some(srtt) => {
                let delta = if srtt > rtt { srtt - rtt } else { rtt - srtt };
                // beta = 1/4, alpha = 1/8
                self.rttvar = self.rttvar * 3 / 4 + delta / 4;
                srtt * 7 / 8 + rtt / 8
            },
        };
        self.srtt = Some(srtt);
        let rto = srtt + cmp::max(CLOCK_GRANULARITY, self.rttvar * 4);
        self.rto = cmp::min(cmp::max(rto, RTO_MIN), RTO_MAX);
    }

    /// Double the timeout after it expired.
    pub fn backoff(&mut self) {
        self.rto = cmp::min(self.rto * 2, RTO_MAX);
    }
}

impl Default for RtoEstimator {
    fn default() -> Self {
        RtoEstimator::new()
    }
}

impl Endpoint {
    /// Retransmit segments whose timeout expired and release connections done with `TIME-WAIT`.
    ///
    /// Connections are visited in the order of their four tuple. Errors of a single connection
    /// are reported and do not prevent the sweep of the others.
    pub fn slow_timer(&mut self, ip: &mut dyn ip::Send, now: Instant) {
        let mut expired = Vec::new();

        for (tuple, connection) in self.connections_mut() {
            if connection.current == State::TimeWait {
                if connection.time_wait_expires.map_or(false, |deadline| now >= deadline) {
                    expired.push(*tuple);
                }
                continue;
            }

            match connection.rto_expires {
                Some(deadline) if now >= deadline => {
                    connection.rto.backoff();
                    net_debug!("tcp: {} timeout, rto now {}ms", tuple, connection.rto.rto().as_millis());
                    if let Err(err) = connection.retransmit_head(ip, now) {
                        net_debug!("tcp: {} retransmission failed: {}", tuple, err);
                    }
                },
                _ => (),
            }

            if let Err(err) = connection.flush(ip, now) {
                net_debug!("tcp: {} flush failed: {}", tuple, err);
            }
        }

        for tuple in expired {
            net_trace!("tcp: {} left TIME-WAIT", tuple);
            self.free_with(&tuple, Error::Closed);
        }
    }

    /// Send all acknowledgements that have been delayed.
    pub fn fast_timer(&mut self, ip: &mut dyn ip::Send) {
        for (tuple, connection) in self.connections_mut() {
            if !connection.delayed_ack {
                continue;
            }

            if let Err(err) = connection.send_ack(ip) {
                net_debug!("tcp: {} delayed ack failed: {}", tuple, err);
            }
        }
    }
}
